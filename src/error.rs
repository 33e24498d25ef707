//! Error types reported by the table and the dict.

use core::alloc::Layout;
use core::fmt;

/// The error returned when the table could not obtain memory for growth.
///
/// A table that reported an `AllocError` is still fully usable: every growth
/// path either completes or leaves the entry log and the index consistent with
/// each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The requested size does not fit in the address space.
    CapacityOverflow,
    /// The allocator refused the request.
    AllocFailed,
}

impl AllocError {
    /// Panics the way `Vec` does for the infallible entry points.
    #[cold]
    #[inline(never)]
    pub(crate) fn raise(self) -> ! {
        match self {
            AllocError::CapacityOverflow => panic!("capacity overflow"),
            AllocError::AllocFailed => {
                // The actual layout is not retained; report a minimal one.
                alloc::alloc::handle_alloc_error(Layout::new::<u64>())
            }
        }
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::CapacityOverflow => f.write_str("capacity overflow"),
            AllocError::AllocFailed => f.write_str("memory allocation failed"),
        }
    }
}

impl core::error::Error for AllocError {}

/// Errors reported by [`Dict`](crate::dict::Dict) operations.
///
/// `E` is the error type of the injected key callbacks
/// ([`KeyOps::Error`](crate::dict::KeyOps::Error)). Callback errors are passed
/// through without interpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DictError<E> {
    /// The key is not present.
    KeyNotFound,
    /// Growing the table failed; the table is left consistent.
    Alloc(AllocError),
    /// A `hash` or `eq` callback failed.
    Callback(E),
}

impl<E> DictError<E> {
    /// Returns `true` for [`DictError::KeyNotFound`].
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, DictError::KeyNotFound)
    }
}

impl<E> From<AllocError> for DictError<E> {
    fn from(err: AllocError) -> Self {
        DictError::Alloc(err)
    }
}

impl<E: fmt::Display> fmt::Display for DictError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictError::KeyNotFound => f.write_str("key not found"),
            DictError::Alloc(err) => write!(f, "{err}"),
            DictError::Callback(err) => write!(f, "key callback failed: {err}"),
        }
    }
}

impl<E> core::error::Error for DictError<E>
where
    E: fmt::Debug + fmt::Display + core::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            DictError::KeyNotFound => None,
            DictError::Alloc(err) => Some(err),
            DictError::Callback(err) => Some(err),
        }
    }
}
