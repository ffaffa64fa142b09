use bpmp_guest_proxy::{ControlNode, GuestProxy, ProxyConfig};
use log::{error, info};

// Maps the window (see BPMP_GUEST_* for where), installs the proxy and fires
// the reset test request once, same as writing to the control node.
fn main() {
    env_logger::init();

    let config = ProxyConfig::from_env().expect("Valid BPMP_GUEST_* configuration");
    let module = GuestProxy::start(config).expect("Map shared window");

    let node = ControlNode::new(module.proxy().clone());
    node.open();
    let ret = node.trigger();
    node.close();
    module.stop();

    if ret < 0 {
        error!("Reset request failed with {}", ret);
        std::process::exit(1);
    }
    info!("Reset request returned {}", ret);
}
