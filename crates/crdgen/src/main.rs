use kube::CustomResourceExt as _;
use pv_pool::api::v1::PvPool;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&PvPool::crd())?);
    Ok(())
}
