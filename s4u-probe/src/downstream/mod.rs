//! The data service reached with the delegated credential.
use crate::{
    config::DownstreamTarget,
    error::{BoxError, ConnectionError},
};
use tracing::warn;

#[cfg(feature = "oracle")]
pub mod oracle;

/// What the probe prints about an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub driver_version: String,
    pub protocol_major: i32,
    pub protocol_minor: i32,
    pub product_name: String,
    pub product_version: String,
    pub url: String,
    pub user: String,
}

/// A live session, authenticated as the impersonated user.
pub trait Connection {
    fn metadata(&mut self) -> Result<ConnectionMetadata, BoxError>;
    fn close(self) -> Result<(), BoxError>;
}

pub trait DataClient {
    /// What the client authenticates with. Consumed by `connect`.
    type Credential;
    type Connection: Connection;

    fn connect(
        &self,
        target: &DownstreamTarget,
        credential: Self::Credential,
    ) -> Result<Self::Connection, ConnectionError>;
}

/// Owns a connection and closes it exactly once: explicitly through
/// `close`, or on drop if that never happened.
pub struct ConnectionGuard<C: Connection> {
    inner: Option<C>,
}

impl<C: Connection> ConnectionGuard<C> {
    pub fn new(conn: C) -> Self {
        ConnectionGuard { inner: Some(conn) }
    }

    // `inner` is only ever taken by `close`, which consumes the guard, and
    // by drop
    fn conn(&mut self) -> &mut C {
        self.inner.as_mut().expect("connection taken before drop")
    }

    pub fn metadata(&mut self) -> Result<ConnectionMetadata, ConnectionError> {
        self.conn().metadata().map_err(ConnectionError::Metadata)
    }

    pub fn close(mut self) -> Result<(), ConnectionError> {
        let conn = self.inner.take().expect("connection taken before drop");
        conn.close().map_err(ConnectionError::Close)
    }
}

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.inner.take() {
            if let Err(e) = conn.close() {
                warn!(error = %e, "closing connection on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    struct Conn {
        closed: Rc<Cell<u32>>,
        metadata_fails: bool,
        close_fails: bool,
    }

    impl Connection for Conn {
        fn metadata(&mut self) -> Result<ConnectionMetadata, BoxError> {
            if self.metadata_fails {
                return Err("ORA-03113: end-of-file on communication channel".into());
            }
            Ok(ConnectionMetadata {
                driver_version: "test".into(),
                protocol_major: 1,
                protocol_minor: 0,
                product_name: "Test".into(),
                product_version: "1.0".into(),
                url: "//db:1521/svc".into(),
                user: "WINUSER".into(),
            })
        }

        fn close(self) -> Result<(), BoxError> {
            self.closed.set(self.closed.get() + 1);
            if self.close_fails {
                Err("socket reset".into())
            } else {
                Ok(())
            }
        }
    }

    fn conn(metadata_fails: bool, close_fails: bool) -> (Conn, Rc<Cell<u32>>) {
        let closed = Rc::new(Cell::new(0));
        let c = Conn {
            closed: closed.clone(),
            metadata_fails,
            close_fails,
        };
        (c, closed)
    }

    #[test]
    fn explicit_close_happens_once() {
        let (c, closed) = conn(false, false);
        let mut guard = ConnectionGuard::new(c);
        assert_eq!(guard.metadata().unwrap().user, "WINUSER");
        guard.close().unwrap();
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn drop_closes_once() {
        let (c, closed) = conn(true, false);
        {
            let mut guard = ConnectionGuard::new(c);
            assert!(matches!(guard.metadata(), Err(ConnectionError::Metadata(_))));
        }
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn close_error_surfaces() {
        let (c, closed) = conn(false, true);
        let guard = ConnectionGuard::new(c);
        assert!(matches!(guard.close(), Err(ConnectionError::Close(_))));
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn failed_close_on_drop_is_not_retried() {
        let (c, closed) = conn(false, true);
        drop(ConnectionGuard::new(c));
        assert_eq!(closed.get(), 1);
    }
}
