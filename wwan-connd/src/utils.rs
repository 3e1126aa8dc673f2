use std::fmt::Display;
use zbus::fdo;

pub trait IntoZResult<T> {
    fn into_z(self) -> fdo::Result<T>;
}

impl<T, E: Display> IntoZResult<T> for Result<T, E> {
    #[inline]
    fn into_z(self) -> fdo::Result<T> {
        self.map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ConnectError;

    #[test]
    fn errors_cross_as_failed_with_their_message() {
        let res: Result<(), _> = Err(ConnectError::InvalidCredential);

        let fdo::Error::Failed(msg) = res.into_z().unwrap_err() else {
            panic!("expected fdo::Error::Failed");
        };
        assert_eq!(msg, "sudo credential missing or rejected");
    }
}
