//! Hardware-accelerated decode engine.
//!
//! Unlike the software tier, the decode capability here cannot be
//! created blind: a parameter unit must be observed before any frame
//! is submitted, and every reconfiguration (new parameters or a size
//! change) tears the capability down, invalidating all pictures in
//! flight. The host supplies the actual accelerated backend.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::VduError;

use super::backend::DecodeBackend;
use super::framer::{self, UnitKind};
use super::queue::FrameQueue;
use super::{DecodeEngine, EngineConfig, FRAME_DURATION_US, MAX_DECODE_QUEUE};

// ── HardwareEngine ───────────────────────────────────────────────

/// Decode engine for the hardware-accelerated tier.
pub struct HardwareEngine<B: DecodeBackend> {
    backend: B,
    config: EngineConfig,
    configured: bool,
    param_cache: Option<Vec<u8>>,
    drop_until_key: bool,
    next_timestamp_us: u64,
    errors: mpsc::UnboundedSender<VduError>,
}

impl<B: DecodeBackend> HardwareEngine<B> {
    pub fn new(backend: B, errors: mpsc::UnboundedSender<VduError>) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
            configured: false,
            param_cache: None,
            drop_until_key: true,
            next_timestamp_us: 0,
            errors,
        }
    }

    fn report(&self, error: VduError) {
        let _ = self.errors.send(error);
    }

    /// (Re)creates the decode capability from the cached parameters.
    /// No-op until a parameter unit has been seen.
    fn reconfigure_from_params(&mut self) {
        if self.param_cache.is_none() {
            return;
        }
        match self.backend.configure(&self.config) {
            Ok(()) => {
                self.configured = true;
                self.drop_until_key = true;
            }
            Err(error) => {
                self.configured = false;
                self.report(error);
            }
        }
    }

    fn handle_param(&mut self, unit: &[u8]) {
        match framer::unit_type(unit) {
            Some(7) => {
                self.param_cache = Some(unit.to_vec());
                self.reconfigure_from_params();
            }
            Some(8) => match &mut self.param_cache {
                Some(cache) => cache.extend_from_slice(unit),
                None => self.param_cache = Some(unit.to_vec()),
            },
            _ => {}
        }
    }

    fn backlogged(&self, queue: &FrameQueue) -> bool {
        queue.backlogged() || self.backend.pending() > MAX_DECODE_QUEUE
    }

    fn decode_unit(&mut self, unit: &Bytes, is_key: bool, queue: &mut FrameQueue) {
        // Frames cannot be submitted before the capability exists.
        if !self.configured {
            return;
        }
        if self.drop_until_key && !is_key {
            return;
        }
        if self.backlogged(queue) && !is_key {
            self.drop_until_key = true;
            return;
        }

        // The hardware decoder requires in-band parameter data.
        let data: Vec<u8> = match (&self.param_cache, is_key) {
            (Some(cache), true) => {
                let mut merged = Vec::with_capacity(cache.len() + unit.len());
                merged.extend_from_slice(cache);
                merged.extend_from_slice(unit);
                merged
            }
            _ => unit.to_vec(),
        };

        let timestamp_us = self.next_timestamp_us;
        self.next_timestamp_us += FRAME_DURATION_US;

        match self.backend.decode(&data, is_key, timestamp_us) {
            Ok(pictures) => {
                for picture in pictures {
                    queue.push(picture);
                }
                if is_key {
                    self.drop_until_key = false;
                }
            }
            Err(error) => {
                if !is_key {
                    self.drop_until_key = true;
                }
                self.report(error);
            }
        }
    }
}

impl<B: DecodeBackend> DecodeEngine for HardwareEngine<B> {
    fn configure(&mut self, config: EngineConfig, queue: &mut FrameQueue) {
        let size_changed = config != self.config;
        self.config = config;
        if size_changed {
            // In-flight pictures were decoded at the old size. They
            // must be disposed, never drawn.
            queue.clear();
            self.backend.reset();
            self.reconfigure_from_params();
        }
    }

    fn submit(&mut self, data: Bytes, queue: &mut FrameQueue) {
        for unit in framer::parse_units(&data) {
            match unit.kind {
                UnitKind::Config => self.handle_param(&unit.bytes),
                UnitKind::Key => self.decode_unit(&unit.bytes, true, queue),
                UnitKind::Delta => self.decode_unit(&unit.bytes, false, queue),
                UnitKind::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DecodedPicture;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct BackendLog {
        configures: usize,
        resets: usize,
        decodes: Vec<(bool, u64, usize)>,
    }

    struct FakeHardwareBackend {
        log: Arc<Mutex<BackendLog>>,
        fail_configure: bool,
        pending: usize,
    }

    impl FakeHardwareBackend {
        fn new() -> (Self, Arc<Mutex<BackendLog>>) {
            let log = Arc::new(Mutex::new(BackendLog::default()));
            (
                Self {
                    log: log.clone(),
                    fail_configure: false,
                    pending: 0,
                },
                log,
            )
        }
    }

    impl DecodeBackend for FakeHardwareBackend {
        fn configure(&mut self, _config: &EngineConfig) -> Result<(), VduError> {
            if self.fail_configure {
                return Err(VduError::DecoderConfig("scripted".into()));
            }
            self.log.lock().unwrap().configures += 1;
            Ok(())
        }

        fn decode(
            &mut self,
            data: &[u8],
            is_key: bool,
            timestamp_us: u64,
        ) -> Result<Vec<DecodedPicture>, VduError> {
            self.log
                .lock()
                .unwrap()
                .decodes
                .push((is_key, timestamp_us, data.len()));
            Ok(vec![DecodedPicture::bgra(8, 8, timestamp_us, vec![0; 256])])
        }

        fn pending(&self) -> usize {
            self.pending
        }

        fn reset(&mut self) {
            self.log.lock().unwrap().resets += 1;
        }
    }

    const START4: &[u8] = &[0x00, 0x00, 0x00, 0x01];

    fn unit(type_byte: u8, payload_len: usize) -> Vec<u8> {
        let mut out = START4.to_vec();
        out.push(type_byte);
        out.extend(std::iter::repeat_n(0xCD, payload_len));
        out
    }

    fn engine(
        backend: FakeHardwareBackend,
    ) -> (
        HardwareEngine<FakeHardwareBackend>,
        mpsc::UnboundedReceiver<VduError>,
        FrameQueue,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HardwareEngine::new(backend, tx), rx, FrameQueue::new())
    }

    #[test]
    fn frames_before_params_are_ignored() {
        let (backend, log) = FakeHardwareBackend::new();
        let (mut engine, _errors, mut queue) = engine(backend);

        engine.submit(Bytes::from(unit(5, 16)), &mut queue);
        assert!(log.lock().unwrap().decodes.is_empty());

        let mut data = unit(7, 8);
        data.extend(unit(5, 16));
        engine.submit(Bytes::from(data), &mut queue);
        let log = log.lock().unwrap();
        assert_eq!(log.configures, 1);
        assert_eq!(log.decodes.len(), 1);
    }

    #[test]
    fn key_frames_carry_in_band_params() {
        let (backend, log) = FakeHardwareBackend::new();
        let (mut engine, _errors, mut queue) = engine(backend);

        let sps = unit(7, 8);
        let pps = unit(8, 4);
        let key = unit(5, 16);
        let mut data = sps.clone();
        data.extend(&pps);
        data.extend(&key);
        engine.submit(Bytes::from(data), &mut queue);

        let log = log.lock().unwrap();
        assert_eq!(log.decodes[0].2, sps.len() + pps.len() + key.len());
    }

    #[test]
    fn size_change_disposes_in_flight_pictures() {
        let (backend, log) = FakeHardwareBackend::new();
        let (mut engine, _errors, mut queue) = engine(backend);

        let mut data = unit(7, 8);
        data.extend(unit(5, 16));
        engine.submit(Bytes::from(data), &mut queue);
        assert_eq!(queue.len(), 1);

        engine.configure(EngineConfig::new(960, 512, 960, 512), &mut queue);
        assert!(queue.is_empty());
        {
            let log = log.lock().unwrap();
            assert_eq!(log.resets, 1);
            assert_eq!(log.configures, 2);
        }

        // Reconfiguration requires a fresh key before deltas flow.
        engine.submit(Bytes::from(unit(1, 16)), &mut queue);
        assert_eq!(log.lock().unwrap().decodes.len(), 1);
    }

    #[test]
    fn same_config_does_not_reconfigure() {
        let (backend, log) = FakeHardwareBackend::new();
        let (mut engine, _errors, mut queue) = engine(backend);

        let config = EngineConfig::default();
        engine.configure(config, &mut queue);
        assert_eq!(log.lock().unwrap().configures, 0);
    }

    #[test]
    fn configure_failure_reports_and_blocks_frames() {
        let (mut backend, log) = FakeHardwareBackend::new();
        backend.fail_configure = true;
        let (mut engine, mut errors, mut queue) = engine(backend);

        let mut data = unit(7, 8);
        data.extend(unit(5, 16));
        engine.submit(Bytes::from(data), &mut queue);

        assert!(matches!(errors.try_recv(), Ok(VduError::DecoderConfig(_))));
        assert!(log.lock().unwrap().decodes.is_empty());
    }

    #[test]
    fn timestamps_are_monotonic() {
        let (backend, log) = FakeHardwareBackend::new();
        let (mut engine, _errors, mut queue) = engine(backend);

        let mut data = unit(7, 8);
        data.extend(unit(5, 16));
        data.extend(unit(1, 16));
        engine.submit(Bytes::from(data), &mut queue);

        let log = log.lock().unwrap();
        assert_eq!(log.decodes[0].1, 0);
        assert_eq!(log.decodes[1].1, FRAME_DURATION_US);
    }
}
