use docker_image_syncer::cli::{Args, Runner};
use docker_image_syncer::logging;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();
    logging::init(args.verbose, args.log_format);

    let runner = Runner::new(args);
    if let Err(e) = runner.run().await {
        if e.is_startup_fatal() {
            error!("Startup failed: {}", e);
        } else {
            error!("{}", e);
        }
        process::exit(1);
    }
}
