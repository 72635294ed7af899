pub mod pod_status;
pub mod pool_api;
pub mod pvpool_controller;
pub mod resources;
pub mod scaling;

#[cfg(test)]
pub mod test_utils;
