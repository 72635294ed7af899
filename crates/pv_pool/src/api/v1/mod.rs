pub mod pvpool;

pub use pvpool::{PvPodInfo, PvPodState, PvPool, PvPoolPhase, PvPoolSpec, PvPoolStatus};
