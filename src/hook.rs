// Process wide redirect of firmware transfers. While a handler is installed
// every transfer goes to it instead of the default (hardware) transport, the
// caller can't tell the difference.
use crate::error::Error;
use crate::message::Message;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

/// Anything that can carry out a firmware transfer.
pub trait TransferHandler: Send + Sync {
    fn transfer(&self, message: Message) -> Result<Message, Error>;
}

impl<F> TransferHandler for F
where
    F: Fn(Message) -> Result<Message, Error> + Send + Sync,
{
    fn transfer(&self, message: Message) -> Result<Message, Error> {
        return self(message);
    }
}

struct HookState {
    handler: Option<Arc<dyn TransferHandler>>,
    // diagnostic verbosity, toggled by the control node
    verbose: bool,
}

static HOOK: Mutex<HookState> = Mutex::new(HookState {
    handler: None,
    verbose: false,
});

fn state() -> MutexGuard<'static, HookState> {
    // the state is two plain fields, a panic elsewhere can't leave it torn
    return HOOK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
}

/// Redirects transfers to `handler`. A second install without a remove
/// replaces the first one.
pub fn install(handler: Arc<dyn TransferHandler>) {
    let mut hook = state();
    if hook.handler.is_some() {
        warn!("Transfer redirect already installed, replacing it");
    }
    hook.handler = Some(handler);
    info!("Transfer redirect installed");
}

pub fn remove() {
    let mut hook = state();
    if hook.handler.take().is_some() {
        info!("Transfer redirect removed");
    }
}

pub fn is_installed() -> bool {
    return state().handler.is_some();
}

pub fn set_verbose(verbose: bool) {
    state().verbose = verbose;
}

pub fn verbose() -> bool {
    return state().verbose;
}

/// Entry point for firmware transfers: goes to the installed handler if there
/// is one, otherwise to `default`.
pub fn transfer(default: &dyn TransferHandler, message: Message) -> Result<Message, Error> {
    // don't hold the hook lock while the handler runs, it may be slow and may
    // want to look at the verbosity flag
    let handler = state().handler.clone();
    match handler {
        Some(handler) => {
            debug!("Redirecting mrq {}", message.request_id);
            return handler.transfer(message);
        }
        None => return default.transfer(message),
    }
}

/// Errno flavoured version of `transfer`. Returns the remote return code on
/// success or a negative error, `message` is updated with the response.
pub fn transfer_status(default: &dyn TransferHandler, message: &mut Message) -> i32 {
    match transfer(default, message.clone()) {
        Ok(response) => {
            *message = response;
            return message.return_code;
        }
        Err(err) => {
            warn!("Transfer of mrq {} failed: {}", message.request_id, err);
            if let Error::Remote(code) = err {
                message.return_code = code;
            }
            return err.errno();
        }
    }
}
