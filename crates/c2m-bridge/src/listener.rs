//! Pieces shared by the CAN and MQTT listeners

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinError};

use crate::error::{BridgeError, BridgeResult};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Connecting,
    Running,
}

/// Abort handles of a listener's background tasks
#[derive(Debug, Default)]
pub(crate) struct Tasks {
    handles: Mutex<Vec<AbortHandle>>,
}

impl Tasks {
    pub fn push(&self, handle: AbortHandle) {
        self.handles.lock().push(handle);
    }

    pub fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Flatten a listener task's join result; cancellation counts as a clean stop
pub(crate) fn join_result(result: Result<BridgeResult<()>, JoinError>) -> BridgeResult<()> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(BridgeError::Task(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[tokio::test]
    async fn test_join_result_cancelled_is_ok() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            BridgeResult::Ok(())
        });
        let tasks = Tasks::default();
        tasks.push(handle.abort_handle());

        tasks.abort_all();
        assert!(join_result(handle.await).is_ok());
    }

    #[tokio::test]
    async fn test_join_result_passes_error() {
        let handle =
            tokio::spawn(async { BridgeResult::<()>::Err(TransportError::ConnectionClosed.into()) });
        assert!(matches!(
            join_result(handle.await),
            Err(BridgeError::Transport(TransportError::ConnectionClosed))
        ));
    }
}
