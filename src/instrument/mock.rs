//! Simulated drivers.
//!
//! Stand-ins for real stages and oscilloscopes so that plans can be run without
//! hardware. All timing uses `tokio::time::sleep`, so tests can run them on a paused
//! clock.
//!
//! - `MockStage`: 10 mm/s motion, 50 ms settling
//! - `MockScope`: synthetic damped sine with a little seeded noise
//!
//! Both support fault injection to exercise step-failure handling.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::trace;

use super::driver::{AcquisitionMode, AcquisitionState, ScopeDriver, StageDriver};

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

/// Simulated linear or rotational stage.
///
/// ```rust,ignore
/// let stage = MockStage::new();
/// stage.move_abs(10.0).await?; // Takes ~1 second
/// assert_eq!(stage.position().await?, 10.0);
/// ```
pub struct MockStage {
    position: Arc<RwLock<f64>>,
    speed_mm_per_sec: f64,
    settle: Duration,
    moves: AtomicUsize,
    fail_on_move: Option<usize>,
}

impl MockStage {
    /// Stage at 0.0 moving at 10 mm/s.
    pub fn new() -> Self {
        Self::with_speed(10.0)
    }

    /// Stage with a custom speed in mm/s.
    pub fn with_speed(speed_mm_per_sec: f64) -> Self {
        Self {
            position: Arc::new(RwLock::new(0.0)),
            speed_mm_per_sec,
            settle: Duration::from_millis(50),
            moves: AtomicUsize::new(0),
            fail_on_move: None,
        }
    }

    /// Make the `n`th move (1-based) fail without moving.
    pub fn fail_on_move(mut self, n: usize) -> Self {
        self.fail_on_move = Some(n);
        self
    }

    /// Number of moves requested so far, failed ones included.
    pub fn move_count(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    fn travel_time(&self, distance: f64) -> Result<Duration> {
        match Duration::try_from_secs_f64(distance / self.speed_mm_per_sec) {
            Ok(delay) => Ok(delay),
            Err(_) => bail!(
                "MockStage: cannot travel {distance} at {} mm/s",
                self.speed_mm_per_sec
            ),
        }
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageDriver for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        let n = self.moves.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_move == Some(n) {
            bail!("MockStage: simulated fault on move #{n}");
        }
        if !target.is_finite() {
            bail!("MockStage: invalid target {target}");
        }

        let current = *self.position.read().await;
        let distance = (target - current).abs();
        let delay = self.travel_time(distance)?;
        trace!(from = current, to = target, ?delay, "MockStage moving");
        sleep(delay).await;

        *self.position.write().await = target;
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }

    async fn wait_settled(&self) -> Result<()> {
        sleep(self.settle).await;
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        let current = *self.position.read().await;
        sleep(self.travel_time(current.abs())?).await;
        *self.position.write().await = 0.0;
        Ok(())
    }
}

// =============================================================================
// MockScope - Simulated Oscilloscope
// =============================================================================

struct ScopeState {
    mode: AcquisitionMode,
    averages: u32,
    state: AcquisitionState,
}

/// Simulated four-channel oscilloscope.
pub struct MockScope {
    record_length: usize,
    sample_interval: f64,
    state: RwLock<ScopeState>,
    rng: Mutex<StdRng>,
    reads: AtomicUsize,
    fail_on_read: Option<usize>,
    short_read: Option<usize>,
}

impl MockScope {
    /// Number of input channels.
    pub const CHANNELS: u8 = 4;

    /// Scope returning `record_length` samples per waveform.
    pub fn new(record_length: usize) -> Self {
        Self {
            record_length,
            sample_interval: 1e-9,
            state: RwLock::new(ScopeState {
                mode: AcquisitionMode::Sample,
                averages: 1,
                state: AcquisitionState::Run,
            }),
            rng: Mutex::new(StdRng::seed_from_u64(0x5ca9)),
            reads: AtomicUsize::new(0),
            fail_on_read: None,
            short_read: None,
        }
    }

    /// Make the `n`th waveform read (1-based) fail.
    pub fn fail_on_read(mut self, n: usize) -> Self {
        self.fail_on_read = Some(n);
        self
    }

    /// Make the `n`th waveform read (1-based) return half a record.
    pub fn short_read(mut self, n: usize) -> Self {
        self.short_read = Some(n);
        self
    }

    /// Current acquisition state.
    pub async fn state(&self) -> AcquisitionState {
        self.state.read().await.state
    }

    /// Number of waveform reads requested so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn synthesize(&self, channel: u8, samples: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let frequency = 5e6 * f64::from(channel);
        let waveform: (Vec<f64>, Vec<f64>) = (0..samples)
            .map(|i| {
                let t = i as f64 * self.sample_interval;
                let signal = (-t * 2e6).exp() * (std::f64::consts::TAU * frequency * t).sin();
                (t, signal + rng.gen_range(-0.01..0.01))
            })
            .unzip();
        Ok(waveform)
    }
}

impl Default for MockScope {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ScopeDriver for MockScope {
    async fn set_acquisition_mode(&self, mode: AcquisitionMode) -> Result<()> {
        self.state.write().await.mode = mode;
        Ok(())
    }

    async fn set_number_averages(&self, averages: u32) -> Result<()> {
        if averages == 0 {
            bail!("MockScope: average count must be positive");
        }
        self.state.write().await.averages = averages;
        Ok(())
    }

    async fn set_acquisition_state(&self, state: AcquisitionState) -> Result<()> {
        self.state.write().await.state = state;
        Ok(())
    }

    async fn get_data(&self, channel: u8) -> Result<(Vec<f64>, Vec<f64>)> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_read == Some(n) {
            bail!("MockScope: simulated timeout on read #{n}");
        }
        if channel == 0 || channel > Self::CHANNELS {
            bail!("MockScope: no channel {channel}");
        }
        let samples = if self.short_read == Some(n) {
            self.record_length / 2
        } else {
            self.record_length
        };
        self.synthesize(channel, samples)
    }

    async fn query_acquisition(&self) -> Result<String> {
        let state = self.state.read().await;
        Ok(format!(
            "ACQ:MOD {};ACQ:NUMAV {};ACQ:STATE {}",
            state.mode, state.averages, state.state
        ))
    }

    async fn record_length(&self) -> Result<usize> {
        Ok(self.record_length)
    }
}
