use log::warn;

use crate::error::ErrorKind;

pub(crate) trait OptionExt<T> {
    /// Turns a missing session or attribute into a logged `NotFound` error.
    fn ok_or_not_found(self, what: &str) -> Result<T, crate::Error>;
}

impl<T> OptionExt<T> for Option<T> {
    #[track_caller]
    fn ok_or_not_found(self, what: &str) -> Result<T, crate::Error> {
        self.ok_or_else(|| {
            warn!("{what} is no longer tracked, dropping the operation");
            crate::Error::new(ErrorKind::NotFound, None, format!("{what} not found"))
        })
    }
}
