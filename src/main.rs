use anyhow::Result;
use tiled_pic::{run, Config};

fn main() -> Result<()> {
    env_logger::init();
    let cfg = Config::new()?;
    run(cfg)
}
