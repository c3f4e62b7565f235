#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod cli;

use std::{process::ExitCode, sync::Arc};

use color_eyre::eyre::Result;
use guillotine::{
    Close, Config, Guillotine, Logger,
    callback::{with_func, with_prefix},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let settings = cli::parse();
    guillotine::logger::install(settings.log_level)?;

    let guillotine = Guillotine::new(Config::default().with_logger(Logger::current()));
    guillotine.listen_for_termination()?;

    if let Err(error) = start(&settings, &guillotine).await {
        error!(?error, "Failed to start !");
        guillotine.execute().await;
        return Ok(ExitCode::from(2));
    }

    info!("Press [CTRL+C] to exit gracefully.");
    let errors = guillotine.wait().await;

    Ok(report(&errors))
}

fn report(errors: &[guillotine::Error]) -> ExitCode {
    if errors.is_empty() {
        info!("Exited gracefully !");
        return ExitCode::SUCCESS;
    }

    for error in errors {
        error!(%error, "Finalizer failed !");
    }
    error!(failures = errors.len(), "Exited with failing finalizers !");

    ExitCode::FAILURE
}

async fn start(settings: &cli::Settings, guillotine: &Guillotine) -> Result<()> {
    debug!(?settings, "Starting...");

    let mut file = File::open(&settings.resource).await?;
    let mut content = Vec::new();
    file.read_to_end(&mut content).await?;

    guillotine.add_closeable(
        file,
        vec![
            with_prefix("closing file"),
            with_func(|| info!("Closing file...")),
        ],
    );

    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!("Listening at {}:{}", settings.host, settings.port);

    let stop = CancellationToken::new();
    let server = tokio::spawn(serve(listener, content.into(), stop.clone()));

    guillotine.add_async_finalizer(
        move || async move {
            stop.cancel();
            server.await
        },
        vec![
            with_prefix("shutting down server"),
            with_func(|| info!("Shutting down server...")),
        ],
    );

    Ok(())
}

async fn serve(listener: TcpListener, content: Arc<[u8]>, stop: CancellationToken) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, address)) => {
                    let content = Arc::clone(&content);

                    tokio::spawn(async move {
                        debug!(%address, "Serving resource...");

                        let served = match stream.write_all(&content).await {
                            Ok(()) => stream.close().await,
                            Err(error) => Err(error),
                        };

                        if let Err(error) = served {
                            error!(?error, %address, "Failed to serve resource !");
                        }
                    });
                }
                Err(error) => error!(?error, "Failed to accept connection !"),
            }
        }
    }

    debug!("Server stopped.");
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn test_report_logs_every_failure() {
        let errors = [
            guillotine::Error::failed(io::Error::other("server did not stop"))
                .with_message("shutting down server"),
            guillotine::Error::failed(io::Error::other("disk full")).with_message("closing file"),
        ];

        assert_eq!(report(&errors), ExitCode::FAILURE);
        assert!(logs_contain("shutting down server: server did not stop"));
        assert!(logs_contain("closing file: disk full"));
        assert!(logs_contain("failures=2"));
    }

    #[test]
    #[traced_test]
    fn test_report_without_failures() {
        assert_eq!(report(&[]), ExitCode::SUCCESS);
        assert!(logs_contain("Exited gracefully !"));
        assert!(!logs_contain("Finalizer failed !"));
    }
}
