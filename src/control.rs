// The user visible control node. Opening it turns on transfer diagnostics,
// writing to it fires a fixed reset request through the proxy so the window
// can be exercised end to end.
use crate::dump::log_dump;
use crate::hook;
use crate::message::MrqResetRequest;
use crate::transfer::GuestProxy;
use log::{info, warn};
use std::sync::Arc;

pub struct ControlNode {
    proxy: Arc<GuestProxy>,
}

impl ControlNode {
    pub fn new(proxy: Arc<GuestProxy>) -> ControlNode {
        return ControlNode { proxy: proxy };
    }

    pub fn open(&self) {
        info!("Control node opened");
        hook::set_verbose(true);
    }

    pub fn close(&self) {
        info!("Control node closed");
        hook::set_verbose(false);
    }

    /// Nothing to read.
    pub fn read(&self, _buffer: &mut [u8]) -> usize {
        return 0;
    }

    /// Contents are ignored, any write fires the reset request.
    pub fn write(&self, _buffer: &[u8]) -> i32 {
        return self.trigger();
    }

    /// Asserts reset on UARTA through the proxy. Returns the remote return
    /// code, or a negative errno if the exchange failed.
    pub fn trigger(&self) -> i32 {
        let message = MrqResetRequest::uarta_assert().to_message();
        if hook::verbose() {
            log_dump("reset request", &message.tx.data);
        }

        match self.proxy.transfer(message) {
            Ok(response) => return response.return_code,
            Err(err) => {
                warn!("Reset request failed: {}", err);
                return err.errno();
            }
        }
    }
}
