/*
 * Guest side of the shared window. One transfer is one exchange:
 * encode the message into a full region image, push the image into the window
 * (writing the mrq slot is what kicks the remote), pull the window back and
 * decode it. The region is a single physical resource so every exchange holds
 * the region lock from the write until the response is decoded.
 */
use crate::codec;
use crate::config::ProxyConfig;
use crate::constants::{MAX_PAYLOAD, POS_EXCHANGE_SEQ, REGION_SIZE};
use crate::dump::log_dump;
use crate::error::Error;
use crate::hook::{self, TransferHandler};
use crate::mem_region::{MemRegion, SharedRegion};
use crate::message::Message;
use crate::utils::compute_crc32;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct GuestProxy {
    region: Mutex<Box<dyn SharedRegion + Send>>,
    config: ProxyConfig,
}

impl GuestProxy {
    /// Maps the window described by `config`.
    pub fn open(config: ProxyConfig) -> Result<GuestProxy, Error> {
        config.validate()?;
        let region = MemRegion::map(&config.mem_path, config.base_address, config.region_size)?;
        return GuestProxy::with_region(Box::new(region), config);
    }

    /// Runs the proxy over an already established region.
    pub fn with_region(
        region: Box<dyn SharedRegion + Send>,
        config: ProxyConfig,
    ) -> Result<GuestProxy, Error> {
        config.validate()?;
        if region.len() < REGION_SIZE {
            return Err(Error::Map(format!(
                "region is {} bytes, the layout needs {}",
                region.len(),
                REGION_SIZE
            )));
        }
        return Ok(GuestProxy {
            region: Mutex::new(region),
            config: config,
        });
    }

    pub fn config(&self) -> &ProxyConfig {
        return &self.config;
    }

    /// Maps the window and installs the proxy as the transfer redirect.
    pub fn start(config: ProxyConfig) -> Result<ProxyModule, Error> {
        return Ok(ProxyModule::start(GuestProxy::open(config)?));
    }

    pub fn transfer(&self, message: Message) -> Result<Message, Error> {
        if message.tx.size() >= MAX_PAYLOAD {
            return Err(Error::InvalidArgument(format!(
                "tx size {} must be below {}",
                message.tx.size(),
                MAX_PAYLOAD
            )));
        }
        let image = codec::encode(&message)?;

        let verbose = hook::verbose();
        if verbose {
            log_dump("tx", &message.tx.data);
            debug!(
                "mrq {} tx image crc {:08x}",
                message.request_id,
                compute_crc32(&image)
            );
        }

        let response = {
            let mut region = self
                .region
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let read_back = match self.config.ack_timeout {
                None => {
                    region.write_block(0, &image)?;
                    region.read_block(0, REGION_SIZE)?
                }
                Some(timeout) => self.exchange_with_ack(&mut **region, &image, timeout)?,
            };
            if verbose {
                debug!("rx image crc {:08x}", compute_crc32(&read_back));
            }
            codec::decode(&read_back)
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                error!("Bad response to mrq {}: {}", message.request_id, err);
                return Err(err);
            }
        };

        if verbose {
            log_dump("rx", &response.rx.data);
        }
        debug!(
            "mrq {} returned {}",
            message.request_id, response.return_code
        );
        if response.return_code < 0 {
            return Err(Error::Remote(response.return_code));
        }
        return Ok(response);
    }

    // Same exchange, but the sequence slot is written last and the window is
    // polled until the remote acks that sequence or the deadline passes.
    fn exchange_with_ack(
        &self,
        region: &mut (dyn SharedRegion + Send),
        image: &[u8; REGION_SIZE],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        let mut seq: u32 = 0;
        while seq == 0 {
            seq = rng.gen();
        }

        // image carries zero seq/ack, so a stale ack from the last exchange
        // is wiped before the new sequence shows up
        region.write_block(0, image)?;
        region.write_block(POS_EXCHANGE_SEQ, &seq.to_le_bytes())?;

        let start = Instant::now();
        loop {
            let read_back = region.read_block(0, REGION_SIZE)?;
            if codec::read_ack(&read_back) == seq {
                return Ok(read_back);
            }
            if start.elapsed() >= timeout {
                warn!("No ack for sequence {:08x} after {:?}", seq, timeout);
                return Err(Error::Timeout(timeout));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

impl TransferHandler for GuestProxy {
    fn transfer(&self, message: Message) -> Result<Message, Error> {
        return GuestProxy::transfer(self, message);
    }
}

/// A proxy that is live as the transfer redirect. Stopping (or dropping) it
/// removes the redirect and releases the window.
pub struct ProxyModule {
    proxy: Arc<GuestProxy>,
}

impl ProxyModule {
    pub fn start(proxy: GuestProxy) -> ProxyModule {
        let proxy = Arc::new(proxy);
        hook::install(proxy.clone());
        info!("Guest proxy started");
        return ProxyModule { proxy: proxy };
    }

    pub fn proxy(&self) -> &Arc<GuestProxy> {
        return &self.proxy;
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ProxyModule {
    fn drop(&mut self) {
        hook::remove();
        info!("Guest proxy stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        POS_EXCHANGE_ACK, POS_MRQ, POS_RET_CODE, POS_RX_BUF, POS_RX_SIZE, POS_TX_BUF,
        POS_TX_SIZE,
    };
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // In memory window that stands in for the remote. `service` runs as soon
    // as a write makes a request visible, which is the mrq slot in the plain
    // exchange and the sequence slot when acks are on.
    struct FakeRemote {
        bytes: Vec<u8>,
        writes: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
        service: Option<fn(&mut [u8])>,
        acks: bool,
    }

    impl FakeRemote {
        fn new(service: Option<fn(&mut [u8])>, acks: bool) -> FakeRemote {
            return FakeRemote {
                bytes: vec![0u8; REGION_SIZE],
                writes: Arc::new(AtomicUsize::new(0)),
                reads: Arc::new(AtomicUsize::new(0)),
                service: service,
                acks: acks,
            };
        }
    }

    impl SharedRegion for FakeRemote {
        fn len(&self) -> usize {
            return self.bytes.len();
        }

        fn write_block(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
            crate::mem_region::check_bounds(offset, data.len(), self.bytes.len())?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.bytes[offset..offset + data.len()].copy_from_slice(data);

            let trigger = if self.acks { POS_EXCHANGE_SEQ } else { POS_MRQ };
            if offset <= trigger && trigger < offset + data.len() {
                if let Some(service) = self.service {
                    service(&mut self.bytes);
                    if self.acks {
                        let seq = codec::read_sequence(&self.bytes);
                        self.bytes[POS_EXCHANGE_ACK..POS_EXCHANGE_ACK + 4]
                            .copy_from_slice(&seq.to_le_bytes());
                    }
                }
            }
            return Ok(());
        }

        fn read_block(&self, offset: usize, len: usize) -> Result<Vec<u8>, Error> {
            crate::mem_region::check_bounds(offset, len, self.bytes.len())?;
            self.reads.fetch_add(1, Ordering::SeqCst);
            return Ok(self.bytes[offset..offset + len].to_vec());
        }
    }

    fn echo(bytes: &mut [u8]) {
        let size = bytes[POS_TX_SIZE] as usize;
        let tx = bytes[POS_TX_BUF..POS_TX_BUF + size].to_vec();
        bytes[POS_RX_BUF..POS_RX_BUF + size].copy_from_slice(&tx);
        bytes[POS_RX_SIZE] = size as u8;
        bytes[POS_RET_CODE] = 0;
    }

    fn einval(bytes: &mut [u8]) {
        bytes[POS_RET_CODE] = (-22i8) as u8;
    }

    fn bad_size(bytes: &mut [u8]) {
        // 0xff is a legal byte, but point the tx size somewhere the echo
        // would not, to check the remote's sizes are the ones used
        bytes[POS_TX_SIZE] = 2;
        bytes[POS_RX_SIZE] = 0xff;
    }

    fn proxy_over(remote: FakeRemote, config: ProxyConfig) -> GuestProxy {
        return GuestProxy::with_region(Box::new(remote), config).expect("Should build");
    }

    #[test]
    fn echo_remote_round_trip() {
        init();
        let proxy = proxy_over(FakeRemote::new(Some(echo), false), ProxyConfig::default());
        let tx = [0x01, 0x65, 0, 0, 0, 0, 0, 0];
        let response = proxy
            .transfer(Message::new(0x01, &tx))
            .expect("Should succeed");
        assert_eq!(response.rx.data, tx.to_vec());
        assert_eq!(response.tx.data, tx.to_vec());
        assert_eq!(response.return_code, 0);
        assert_eq!(response.request_id, 0x01);
    }

    #[test]
    fn negative_return_code_is_an_error() {
        init();
        let proxy = proxy_over(FakeRemote::new(Some(einval), false), ProxyConfig::default());
        let err = proxy
            .transfer(Message::new(20, &[1, 2, 3]))
            .expect_err("remote failed");
        assert_eq!(err, Error::Remote(-22));
        assert!(err.errno() < 0);
    }

    #[test]
    fn remote_sizes_are_authoritative() {
        init();
        let proxy = proxy_over(FakeRemote::new(Some(bad_size), false), ProxyConfig::default());
        let response = proxy
            .transfer(Message::new(7, &[5, 6, 7, 8]))
            .expect("Should succeed");
        assert_eq!(response.tx.data, vec![5, 6]);
        assert_eq!(response.rx.size(), 0xff);
    }

    #[test]
    fn oversized_tx_never_touches_region() {
        init();
        let remote = FakeRemote::new(Some(echo), false);
        let writes = remote.writes.clone();
        let reads = remote.reads.clone();
        let proxy = proxy_over(remote, ProxyConfig::default());

        for size in [MAX_PAYLOAD, MAX_PAYLOAD + 1, 4096] {
            let err = proxy
                .transfer(Message::new(1, &vec![0u8; size]))
                .expect_err("too big");
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
        // fits the buffer but not the size byte, still rejected up front
        proxy
            .transfer(Message::new(1, &[0u8; 511]))
            .expect_err("too big for the wire");

        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_write_and_one_read_per_exchange() {
        init();
        let remote = FakeRemote::new(Some(echo), false);
        let writes = remote.writes.clone();
        let reads = remote.reads.clone();
        let proxy = proxy_over(remote, ProxyConfig::default());
        proxy
            .transfer(Message::new(1, &[1]))
            .expect("Should succeed");
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn small_regions_rejected() {
        init();
        let mut remote = FakeRemote::new(None, false);
        remote.bytes = vec![0u8; 100];
        let err = GuestProxy::with_region(Box::new(remote), ProxyConfig::default())
            .err()
            .expect("Should fail");
        assert!(matches!(err, Error::Map(_)));
    }

    #[test]
    fn ack_handshake() {
        init();
        let mut config = ProxyConfig::default();
        config.ack_timeout = Some(Duration::from_millis(500));
        let proxy = proxy_over(FakeRemote::new(Some(echo), true), config);
        let response = proxy
            .transfer(Message::new(3, b"ping"))
            .expect("Should succeed");
        assert_eq!(response.rx.data, b"ping".to_vec());
    }

    #[test]
    fn silent_remote_times_out() {
        init();
        let mut config = ProxyConfig::default();
        config.ack_timeout = Some(Duration::from_millis(20));
        config.poll_interval = Duration::from_millis(1);
        let proxy = proxy_over(FakeRemote::new(None, true), config);

        let start = Instant::now();
        let err = proxy
            .transfer(Message::new(3, b"ping"))
            .expect_err("nobody answers");
        assert_eq!(err, Error::Timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(err.errno(), -libc::ETIMEDOUT);
    }

    #[test]
    fn concurrent_transfers_do_not_interleave() {
        init();
        let proxy = Arc::new(proxy_over(
            FakeRemote::new(Some(echo), false),
            ProxyConfig::default(),
        ));
        let mut handles = vec![];
        for t in 0..4u8 {
            let proxy = proxy.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200u8 {
                    let tx = vec![t; (i as usize % 32) + 1];
                    let response = proxy
                        .transfer(Message::new(t as u32, &tx))
                        .expect("Should succeed");
                    assert_eq!(response.rx.data, tx);
                    assert_eq!(response.request_id, t as u32);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread panicked");
        }
    }

    #[test]
    fn memfd_window_loops_back() {
        init();
        let region = MemRegion::memfd("loopback", REGION_SIZE).expect("Should map");
        let proxy = GuestProxy::with_region(Box::new(region), ProxyConfig::default())
            .expect("Should build");
        // nobody services the window, so we read back exactly what we wrote
        let response = proxy
            .transfer(Message::new(9, &[4, 5, 6]))
            .expect("Should succeed");
        assert_eq!(response.tx.data, vec![4, 5, 6]);
        assert_eq!(response.rx.size(), 0);
        assert_eq!(response.return_code, 0);
    }

    #[test]
    #[serial]
    fn module_lifecycle_drives_hook() {
        init();
        hook::remove();
        let hardware = |_message: Message| -> Result<Message, Error> {
            Err(Error::InvalidArgument("hardware path".into()))
        };

        let module = ProxyModule::start(proxy_over(
            FakeRemote::new(Some(echo), false),
            ProxyConfig::default(),
        ));
        assert!(hook::is_installed());
        let response = hook::transfer(&hardware, Message::new(1, &[7, 7]))
            .expect("Should go through the proxy");
        assert_eq!(response.rx.data, vec![7, 7]);
        assert_eq!(module.proxy().config().region_size, REGION_SIZE);

        module.stop();
        assert!(!hook::is_installed());
        hook::transfer(&hardware, Message::new(1, &[7, 7])).expect_err("back on hardware");
    }

    #[test]
    #[serial]
    fn verbose_transfers_still_work() {
        init();
        hook::set_verbose(true);
        let proxy = proxy_over(FakeRemote::new(Some(echo), false), ProxyConfig::default());
        let response = proxy
            .transfer(Message::new(2, b"dump me"))
            .expect("Should succeed");
        hook::set_verbose(false);
        assert_eq!(response.rx.data, b"dump me".to_vec());
    }
}
