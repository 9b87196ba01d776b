use envhub::{
    arguments::{patterns, print_debug_info, print_help},
    logger::{self as logger, LogTag},
};

/// Main entry point for envhub
///
/// Loads `.env`, initializes logging from the command line, then serves the
/// notification hub until Ctrl-C.
#[tokio::main]
async fn main() {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    logger::init();

    if patterns::is_help_requested() {
        print_help();
        std::process::exit(0);
    }

    logger::info(LogTag::System, "envhub starting up...");
    print_debug_info();

    match envhub::run::run_server().await {
        Ok(()) => logger::info(LogTag::System, "envhub stopped"),
        Err(e) => {
            logger::error(LogTag::System, &format!("envhub failed: {}", e));
            std::process::exit(1);
        }
    }
}
