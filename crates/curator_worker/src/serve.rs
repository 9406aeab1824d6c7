//! Worker-side loop answering requests from the coordinator.

use std::io::{Read, Write};

use tracing::{debug, info};

use crate::backend::JobExecutor;
use crate::error::WorkerError;
use crate::protocol::{read_frame, write_frame, Request, Response, WorkResult};

/// Serves requests read from `input` until a shutdown request or the end of
/// the stream, writing responses to `output`.
///
/// A panic in `executor` is not caught: it takes down the worker process,
/// which the coordinator reports as a crashed job.
pub fn serve<R: Read, W: Write>(
    executor: &dyn JobExecutor,
    mut input: R,
    mut output: W,
) -> Result<(), WorkerError> {
    info!("worker ready");
    while let Some(request) = read_frame::<_, Request>(&mut input)? {
        match request {
            Request::Ping => write_frame(&mut output, &Response::Pong)?,
            Request::Run(job) => {
                debug!(guid = %job.guid, kind = %job.kind, path = %job.input.asset_path, "running job");
                let result = match executor.execute(&job) {
                    Ok(hash) => WorkResult::Success(hash),
                    Err(log) => WorkResult::Failure(log),
                };
                write_frame(&mut output, &Response::Done(result))?;
            }
            Request::Shutdown => break,
        }
    }
    info!("worker shutting down");
    Ok(())
}
