use anyhow::Result;

use stonewall::uci::UciHandler;

fn main() -> Result<()> {
    // Diagnostics go to stderr via the logger; stdout stays clean for
    // the UCI protocol.
    env_logger::init();

    let mut handler = UciHandler::new();
    handler.run();
    Ok(())
}
