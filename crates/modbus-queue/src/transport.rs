use alloc::vec::Vec;

use crate::error::TransportError;

/// One physical request/response link to the field bus.
///
/// Implementors perform exactly one holding-register transaction per call.
/// The queue worker is the only caller for its bus, so an implementation
/// never sees two calls in flight at once. The queue adds no timeout of its
/// own: a call that never returns stalls every command behind it.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Read `count` holding registers starting at `address`.
    async fn read_holding(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Write `values` to consecutive holding registers starting at
    /// `address`.
    async fn write_holding(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    async fn read_holding(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        (**self).read_holding(address, count).await
    }

    async fn write_holding(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        (**self).write_holding(address, values).await
    }
}
