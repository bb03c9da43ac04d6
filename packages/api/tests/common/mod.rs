#![allow(dead_code)]

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use api::{Studio, StudioConfig, init_studio};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Config with fast runners rooted in `dir`.
pub fn config(dir: &Path) -> StudioConfig {
    StudioConfig {
        model_dir: dir.join("models"),
        epoch_delay: Duration::from_millis(5),
        step_delay: Duration::from_millis(2),
        ..StudioConfig::default()
    }
}

pub async fn studio(dir: &Path) -> Result<Studio, Box<dyn Error>> {
    Ok(init_studio(config(dir)).await?)
}

pub fn samples() -> Vec<String> {
    (0..10).map(|i| format!("sample-{i}.mp4")).collect()
}
