//! Background upload. One thread per transfer, hands its result to the render
//! thread through a channel.

use crate::data::VertexRecord;
use crossbeam_channel::Sender;
use scan_transfer::{TransferClient, UploadResult};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    thread,
};

/// Outcome of one transfer, delivered exactly once.
#[derive(Debug)]
pub enum TransferEvent {
    /// The processed cloud was stored and decoded.
    Completed {
        result: UploadResult,
        points: Vec<VertexRecord>,
    },
    /// The service succeeded but the stored file could not be decoded.
    Undecodable { result: UploadResult, error: io::Error },
    Failed(anyhow::Error),
}

/// Runs one upload-and-fetch on the calling thread and decodes the stored file.
pub fn run_transfer(client: &TransferClient, endpoint: &str, scan: &Path) -> TransferEvent {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return TransferEvent::Failed(e.into()),
    };

    let result = match rt.block_on(client.upload_and_fetch(endpoint, scan)) {
        Ok(result) => result,
        Err(e) => return TransferEvent::Failed(e.into()),
    };

    match scanply::read_file(&result.saved_file_path) {
        Ok(points) => {
            if result.point_count != 0 && result.point_count != points.len() as u64 {
                log::warn!(
                    "Service reported {} points, stored file holds {}",
                    result.point_count,
                    points.len()
                );
            }
            TransferEvent::Completed { result, points }
        }
        Err(error) => TransferEvent::Undecodable { result, error },
    }
}

pub fn spawn_upload(
    client: TransferClient,
    endpoint: String,
    scan: PathBuf,
    tx: Sender<TransferEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::info!("Uploading {} to {}", scan.display(), endpoint);
        // A panic still has to produce the one event the viewer waits for.
        let event = panic::catch_unwind(AssertUnwindSafe(|| run_transfer(&client, &endpoint, &scan)))
            .unwrap_or_else(|_| TransferEvent::Failed(anyhow::anyhow!("transfer thread panicked")));
        match &event {
            TransferEvent::Completed { points, .. } => {
                log::info!("Transfer completed, {} points decoded", points.len())
            }
            TransferEvent::Undecodable { error, .. } => {
                log::error!("Processed file could not be decoded: {}", error)
            }
            TransferEvent::Failed(e) => log::error!("Transfer failed: {:#}", e),
        }
        // The receiver is gone only when the viewer is shutting down.
        if tx.send(event).is_err() {
            log::debug!("Transfer result dropped, viewer closed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_transfer::{TransferConfig, TransferError};

    #[test]
    fn missing_scan_fails_without_network() {
        let client = TransferClient::new(TransferConfig::default()).unwrap();
        let event = run_transfer(
            &client,
            "http://127.0.0.1:9/process-with-file",
            Path::new("/definitely/not/here.ply"),
        );
        match event {
            TransferEvent::Failed(e) => assert!(matches!(
                e.downcast_ref::<TransferError>(),
                Some(TransferError::FileReadFailed { .. })
            )),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn spawn_upload_sends_exactly_once() {
        let client = TransferClient::new(TransferConfig::default()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        spawn_upload(
            client,
            "http://127.0.0.1:9/process-with-file".into(),
            PathBuf::from("/definitely/not/here.ply"),
            tx,
        )
        .join()
        .unwrap();

        assert!(matches!(rx.try_recv(), Ok(TransferEvent::Failed(_))));
        assert!(rx.try_recv().is_err());
    }
}
