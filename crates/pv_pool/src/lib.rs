pub mod agent;
pub mod api;
pub mod controllers;
pub mod util;
