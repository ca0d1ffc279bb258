//! Package-endpoint demo: registers `/v1/pkg`, serves until enter is
//! pressed, then stops and shuts the engine down.

use std::io::BufRead;

use restive::config::LogLevel;
use restive::{Engine, EngineConfig, MethodHandlers};

fn main() -> restive::Result<()> {
    let mut config = EngineConfig::default();
    config.port = 8080;
    config.daemon_name = "pkg-demo".to_owned();
    config.debug_log_level = LogLevel::Debug;

    tracing_subscriber::fmt()
        .with_max_level(match config.debug_log_level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        })
        .init();

    let mut engine = Engine::init(config)?;

    engine.register_endpoint(
        "/v1/pkg",
        MethodHandlers::new()
            .on_get(|exchange| {
                let body = b"package index is empty\n";
                exchange.response_mut().set_content_length(body.len() as u64);
                exchange.send_payload(body)?;
                Ok(())
            })
            .on_post(|exchange| {
                let mut received = 0usize;
                let mut buf = [0u8; 1024];
                loop {
                    let chunk = exchange.read_payload(&mut buf)?;
                    received += chunk.bytes;
                    if chunk.done {
                        break;
                    }
                }

                let body = format!("stored {received} bytes\n");
                exchange
                    .response_mut()
                    .set_content_length(body.len() as u64);
                exchange.send_payload(body.as_bytes())?;
                Ok(())
            }),
    )?;

    engine.start()?;
    println!("serving http://127.0.0.1:8080/v1/pkg (press enter to exit)");

    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    engine.stop(10)?;
    engine.shutdown()?;
    Ok(())
}
