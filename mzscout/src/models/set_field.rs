use crate::errors::BuilderError;

/// A builder slot that knows whether it was ever set.
///
/// Unlike `Option`, extracting the value goes through [`expect_some`],
/// which turns an unset prerequisite into a `BuilderError` naming the
/// missing field instead of a bare `None`.
///
/// [`expect_some`]: SetField::expect_some
#[derive(Debug, Clone, Copy, Default)]
pub enum SetField<T> {
    Some(T),
    #[default]
    None,
}

impl<T> SetField<T> {
    pub fn is_some(&self) -> bool {
        matches!(self, Self::Some(_))
    }

    pub fn expect_some(
        self,
        field: &'static str,
        context: &'static str,
    ) -> Result<T, BuilderError> {
        match self {
            Self::Some(v) => Ok(v),
            Self::None => Err(BuilderError::ExpectedSetField { field, context }),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Some(v) => Some(v),
            Self::None => None,
        }
    }
}
