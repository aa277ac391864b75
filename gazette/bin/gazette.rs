#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use gazette::{Gazette, controller::find_config_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = find_config_file()?;
    let gazette = Gazette::load(&config_path)?;

    gazette.run().await
}
