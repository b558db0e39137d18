//! Line-oriented console loop over an injected reader and writer.
//!
//! Each input line is a user id; each output line is the decision for it.
//! The loop has no knowledge of which limiter it drives or where its bytes
//! come from, so the binary wires it to stdin/stdout and tests wire it to
//! in-memory buffers.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::Result;
use crate::floodcontrol::{FloodControl, UserId};

/// Tally of decisions made during one console session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub admitted: u64,
    pub rejected: u64,
    pub invalid: u64,
}

/// Read user ids until EOF, answering each with the limiter's decision.
///
/// Answers are `true` for an admitted request and `false: <reason>` for a
/// rejected one. Lines that are not integers (including lines that are not
/// UTF-8) get an `error:` answer and do not reach the limiter. Blank lines
/// are ignored.
pub async fn run<R, W>(limiter: &dyn FloodControl, reader: R, writer: W) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    run_until(limiter, reader, writer, std::future::pending()).await
}

/// Like [`run`], but stops early once `shutdown` resolves.
///
/// The stats returned on shutdown cover every line answered before it.
pub async fn run_until<R, W, F>(
    limiter: &dyn FloodControl,
    reader: R,
    mut writer: W,
    shutdown: F,
) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut stats = SessionStats::default();

    let outcome = tokio::select! {
        result = answer_lines(limiter, reader, &mut writer, &mut stats) => result,
        _ = shutdown => {
            debug!("Console session interrupted");
            Ok(())
        }
    };
    outcome?;

    debug!(
        admitted = stats.admitted,
        rejected = stats.rejected,
        invalid = stats.invalid,
        "Console session ended"
    );
    Ok(stats)
}

async fn answer_lines<R, W>(
    limiter: &dyn FloodControl,
    mut reader: R,
    writer: &mut W,
    stats: &mut SessionStats,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }

        let reply = match std::str::from_utf8(&buf).map(str::trim) {
            Ok("") => continue,
            Ok(input) => match input.parse::<UserId>() {
                Ok(key) => decide(limiter, key, stats)?,
                Err(_) => reject_input(input, stats),
            },
            Err(_) => reject_input(String::from_utf8_lossy(&buf).trim(), stats),
        };

        writer.write_all(format!("{}\n", reply).as_bytes()).await?;
        writer.flush().await?;
    }
}

fn decide(limiter: &dyn FloodControl, key: UserId, stats: &mut SessionStats) -> Result<String> {
    match limiter.check(key) {
        Ok(()) => {
            stats.admitted += 1;
            Ok("true".to_string())
        }
        Err(e) if e.is_rate_limited() => {
            stats.rejected += 1;
            Ok(format!("false: {}", e))
        }
        Err(e) => Err(e),
    }
}

fn reject_input(input: &str, stats: &mut SessionStats) -> String {
    warn!(input, "Ignoring non-numeric user id");
    stats.invalid += 1;
    format!("error: invalid user id \"{}\"", input)
}
