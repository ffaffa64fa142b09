use bpmp_guest_proxy::{
    hex_dump, read_sequence, MemRegion, ProxyConfig, SharedRegion, POS_EXCHANGE_ACK,
    POS_RET_CODE, POS_RX_BUF, POS_RX_SIZE, POS_TX_BUF, POS_TX_SIZE, REGION_SIZE,
};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Stand-in remote for trying the guest without a real host. Polls the window
// and answers every new exchange sequence by echoing tx into rx with a zero
// return code. Only guests running with BPMP_GUEST_ACK_TIMEOUT_MS set wait
// long enough to see the answer.
fn main() {
    env_logger::init();

    let config = ProxyConfig::from_env().expect("Valid BPMP_GUEST_* configuration");
    let mut region = MemRegion::map(&config.mem_path, config.base_address, REGION_SIZE)
        .expect("Map shared window");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .expect("Install ctrl-c handler");
    }

    info!("Servicing {}", config.mem_path.display());
    let mut last_seq: u32 = 0;
    while running.load(Ordering::SeqCst) {
        let image = region.read_block(0, REGION_SIZE).expect("Read window");
        let seq = read_sequence(&image);
        if seq == 0 || seq == last_seq {
            std::thread::sleep(config.poll_interval);
            continue;
        }

        let size = image[POS_TX_SIZE] as usize;
        let tx = &image[POS_TX_BUF..POS_TX_BUF + size];
        debug!("{}", hex_dump(Some("tx"), tx));

        region.write_block(POS_RX_BUF, tx).expect("Write rx");
        region
            .write_block(POS_RX_SIZE, &[size as u8])
            .expect("Write rx size");
        region.write_block(POS_RET_CODE, &[0]).expect("Write ret");
        // ack last, the guest reads everything once it sees it
        region
            .write_block(POS_EXCHANGE_ACK, &seq.to_le_bytes())
            .expect("Write ack");

        info!("Answered sequence {:08x} ({} bytes)", seq, size);
        last_seq = seq;
    }

    info!("Stopping");
}
