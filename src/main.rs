// Soku Linker CLI entry point

use soku_linker::cli::CliHandler;
use soku_linker::LinkerError;

#[tokio::main]
async fn main() {
    let handler = CliHandler::new();

    if let Err(e) = handler.run().await {
        match e.downcast_ref::<LinkerError>() {
            Some(err) => eprintln!("{}", err.format_detailed()),
            None => eprintln!("❌ Error: {:#}", e),
        }
        std::process::exit(1);
    }
}
