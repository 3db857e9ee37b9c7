//! Trait abstraction for stream transports to enable testing

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Any bidirectional async byte stream
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Opens a fresh byte stream on every call
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is unreachable or the open timed out
    async fn connect(&self) -> Result<Box<dyn ByteStream>>;

    /// Human-readable endpoint, used in log lines
    fn describe(&self) -> String;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::FieldLinkError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Connector that hands out pre-built streams in order
    ///
    /// Each call records its (virtual) time. Once the queue is empty every
    /// further call fails with a connection error.
    #[derive(Clone, Default)]
    pub struct ScriptedConnector {
        pub streams: Arc<Mutex<VecDeque<Result<Box<dyn ByteStream>>>>>,
        pub attempts: Arc<Mutex<Vec<Instant>>>,
        pub on_connect: Option<Arc<dyn Fn() + Send + Sync>>,
    }

    impl ScriptedConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_stream<S: ByteStream + 'static>(&self, stream: S) {
            self.streams.lock().unwrap().push_back(Ok(Box::new(stream)));
        }

        pub fn push_error(&self, error: FieldLinkError) {
            self.streams.lock().unwrap().push_back(Err(error));
        }

        pub fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> Result<Box<dyn ByteStream>> {
            self.attempts.lock().unwrap().push(Instant::now());
            if let Some(hook) = &self.on_connect {
                hook();
            }
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FieldLinkError::Connect("no scripted stream left".to_string())))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }
}
