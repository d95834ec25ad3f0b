use crate::calibration::Calibration;
use crate::command::CommandChannel;
use crate::config::ControllerConfig;
use crate::hid::{self, HidTransport};
use crate::orientation::{OrientationBasis, OrientationFilter};
use crate::poller::{Poller, PollerHandle};
use crate::protocol::{
    HalfLayout, IMU_SAMPLES, IMU_STEP_S, REPORT_MODE_FULL, REPORT_MODE_SIMPLE,
    SUBCMD_ENABLE_IMU, SUBCMD_ENABLE_VIBRATION, SUBCMD_MANUAL_PAIRING, SUBCMD_SET_PLAYER_LEDS,
    SUBCMD_SET_REPORT_MODE,
};
use crate::queue::{PollEvent, ReportQueue};
use crate::report::{ButtonSet, RawReport, ReportDecoder};
use crate::transport::Transport;
use crate::types::{Button, ConnectionState, DeviceInfo, Handedness, ImuSample, PlayerLeds, Vector2, Vector3};
use crate::{JoyConError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Latest decoded values, owned by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub connection: ConnectionState,
    pub buttons: ButtonSet,
    /// Calibrated stick, roughly -1..1 per axis.
    pub stick: Vector2,
    pub raw_stick: [u16; 2],
    /// Degrees per second.
    pub gyro: Vector3,
    /// g.
    pub accel: Vector3,
    pub orientation: OrientationBasis,
}

impl ControllerState {
    fn set_imu(&mut self, sample: ImuSample) {
        self.gyro = sample.gyro;
        self.accel = sample.accel;
    }
}

/// Counters and accumulators kept alongside the decoded state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Diagnostics {
    /// Largest-magnitude acceleration seen per axis, sign kept.
    pub peak_accel: Vector3,
    /// Σ gyro·dt per axis in degrees.
    pub gyro_integral: Vector3,
    pub reports_processed: u64,
    pub duplicate_timestamps_enqueued: u64,
    pub duplicate_timestamps_dequeued: u64,
}

impl Diagnostics {
    fn record_accel(&mut self, accel: Vector3) {
        let peak = &mut self.peak_accel;
        for (p, a) in [(&mut peak.x, accel.x), (&mut peak.y, accel.y), (&mut peak.z, accel.z)] {
            if a.abs() > p.abs() {
                *p = a;
            }
        }
    }
}

/// One Joy-Con half.
///
/// `attach` runs the handshake and reads calibration; reports then flow
/// from a [`Poller`] through the report queue into [`update`](Self::update),
/// which is meant to be called once per host frame.
pub struct Controller<T: Transport> {
    transport: Arc<Mutex<T>>,
    commands: CommandChannel<T>,
    layout: HalfLayout,
    config: ControllerConfig,
    decoder: Option<ReportDecoder>,
    filter: OrientationFilter,
    state: ControllerState,
    polling: Arc<AtomicBool>,
    queue: ReportQueue,
    imu_timestamp: u8,
    last_dequeued: Option<u8>,
    enqueue_duplicates: Arc<AtomicU64>,
    diagnostics: Diagnostics,
}

impl Controller<HidTransport> {
    /// Open a discovered Joy-Con. The controller is not attached yet.
    pub fn open(info: &DeviceInfo, config: ControllerConfig) -> Result<Self> {
        let transport = HidTransport::open(&info.path)?;
        log::info!(
            "Opened Joy-Con ({:?}) serial={} pid={:04x}",
            info.handedness,
            info.serial,
            info.product_id
        );
        Ok(Self::new(transport, info.handedness, config))
    }

    /// Open the first connected Joy-Con, optionally of a given half.
    pub fn open_first(handedness: Option<Handedness>, config: ControllerConfig) -> Result<Self> {
        let info = hid::find_first(handedness)?;
        Self::open(&info, config)
    }
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T, handedness: Handedness, config: ControllerConfig) -> Self {
        let transport = Arc::new(Mutex::new(transport));
        Self {
            commands: CommandChannel::new(transport.clone()),
            transport,
            layout: HalfLayout::new(handedness),
            filter: OrientationFilter::new(config.filter_coefficient),
            config,
            decoder: None,
            state: ControllerState::default(),
            polling: Arc::new(AtomicBool::new(false)),
            queue: ReportQueue::new(),
            imu_timestamp: 0,
            last_dequeued: None,
            enqueue_duplicates: Arc::new(AtomicU64::new(0)),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn handedness(&self) -> Handedness {
        self.layout.handedness
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run the attach handshake and start accepting reports.
    ///
    /// Command timeouts during the handshake are tolerated; a calibration
    /// read that never matches fails the attach and leaves the controller
    /// `NotAttached`.
    pub fn attach(&mut self, leds: PlayerLeds) -> Result<()> {
        if self.state.connection != ConnectionState::NotAttached {
            return Err(JoyConError::AlreadyAttached(self.state.connection));
        }

        self.commands.send_subcommand(SUBCMD_SET_REPORT_MODE, &[REPORT_MODE_SIMPLE])?;
        let calibration = Calibration::read(&mut self.commands, &self.layout)?;

        for step in 1..=3u8 {
            self.commands.send_subcommand(SUBCMD_MANUAL_PAIRING, &[step])?;
        }
        self.commands.send_subcommand(SUBCMD_SET_PLAYER_LEDS, &[leds.bits()])?;
        self.commands
            .send_subcommand(SUBCMD_ENABLE_IMU, &[u8::from(self.config.imu_enabled)])?;
        self.commands.send_subcommand(SUBCMD_SET_REPORT_MODE, &[REPORT_MODE_FULL])?;
        self.commands.send_subcommand(SUBCMD_ENABLE_VIBRATION, &[0x01])?;

        self.decoder = Some(ReportDecoder::new(self.layout.clone(), calibration));
        self.filter = OrientationFilter::new(self.config.filter_coefficient);
        self.state = ControllerState {
            connection: ConnectionState::Attached,
            ..Default::default()
        };
        self.imu_timestamp = 0;
        self.last_dequeued = None;
        self.enqueue_duplicates.store(0, Ordering::Relaxed);
        self.diagnostics = Diagnostics::default();
        self.queue.clear();
        self.polling.store(true, Ordering::Release);

        log::info!(
            "Joy-Con ({:?}) attached, leds={:?} imu={}",
            self.layout.handedness,
            leds,
            self.config.imu_enabled
        );
        Ok(())
    }

    /// Stop polling and, if attached, send the shutdown sequence.
    ///
    /// Safe from any state. Command failures are logged, not returned:
    /// a dropped controller usually cannot hear them anyway.
    pub fn detach(&mut self) {
        self.polling.store(false, Ordering::Release);

        if self.state.connection > ConnectionState::NotAttached {
            let shutdown: [(u8, u8); 4] = [
                (SUBCMD_SET_PLAYER_LEDS, 0x00),
                (SUBCMD_ENABLE_IMU, 0x00),
                (SUBCMD_ENABLE_VIBRATION, 0x00),
                (SUBCMD_SET_REPORT_MODE, REPORT_MODE_SIMPLE),
            ];
            for (subcommand, arg) in shutdown {
                if let Err(e) = self.commands.send_subcommand(subcommand, &[arg]) {
                    log::warn!("Detach: subcommand 0x{:02x} failed: {}", subcommand, e);
                }
            }
            log::info!("Joy-Con ({:?}) detached", self.layout.handedness);
        }

        self.queue.clear();
        self.state.connection = ConnectionState::NotAttached;
        self.state.buttons.clear();
    }

    /// Producer for this controller's report queue.
    ///
    /// Drive it with [`Poller::poll`] or hand it to a thread with
    /// [`Poller::spawn`].
    pub fn poller(&self) -> Result<Poller<T>> {
        if self.state.connection < ConnectionState::Attached {
            return Err(JoyConError::NotAttached);
        }
        Ok(Poller::new(
            self.transport.clone(),
            self.queue.sender(),
            self.polling.clone(),
            self.enqueue_duplicates.clone(),
            self.config.drop_threshold,
            self.config.poll_timeout_ms,
        ))
    }

    /// Process every queued report in arrival order.
    ///
    /// Returns how many reports were processed. Once the poller has
    /// reported a lost connection the state is `Dropped` and this returns
    /// `ConnectionDropped` until the controller is detached and attached
    /// again.
    pub fn update(&mut self) -> Result<usize> {
        match self.state.connection {
            ConnectionState::NotAttached => return Err(JoyConError::NotAttached),
            ConnectionState::Dropped => return Err(JoyConError::ConnectionDropped),
            ConnectionState::Attached | ConnectionState::ImuDataOk => {}
        }
        if !self.polling.load(Ordering::Acquire) {
            return Ok(0);
        }

        let pending = self.queue.len();
        let mut processed = 0;
        for _ in 0..pending {
            match self.queue.pop() {
                Some(PollEvent::Report(report)) => {
                    self.process_report(&report);
                    processed += 1;
                }
                Some(PollEvent::Dropped) => {
                    self.polling.store(false, Ordering::Release);
                    self.state.connection = ConnectionState::Dropped;
                    log::warn!(
                        "Joy-Con ({:?}) dropped after {} reports",
                        self.layout.handedness,
                        self.diagnostics.reports_processed
                    );
                    return Err(JoyConError::ConnectionDropped);
                }
                None => break,
            }
        }
        Ok(processed)
    }

    fn process_report(&mut self, report: &RawReport) {
        if self.state.connection == ConnectionState::Attached {
            self.state.connection = ConnectionState::ImuDataOk;
            log::info!("Joy-Con ({:?}) receiving data", self.layout.handedness);
        }
        let Some(decoder) = self.decoder.as_ref() else {
            return;
        };

        if self.config.imu_enabled
            && report.has_imu()
            && self.state.connection >= ConnectionState::ImuDataOk
        {
            if self.config.orientation_enabled {
                let mut steps = report.timestamp().wrapping_sub(self.imu_timestamp);
                for n in 0..IMU_SAMPLES {
                    let sample = decoder.imu_sample(report, n);
                    let dt_seconds = IMU_STEP_S * steps as f32;
                    self.diagnostics.gyro_integral += sample.gyro * dt_seconds;
                    self.filter.update(&sample, dt_seconds);
                    self.diagnostics.record_accel(sample.accel);
                    self.state.set_imu(sample);
                    steps = 1;
                }
                self.state.orientation = *self.filter.basis();
                self.imu_timestamp = report.timestamp().wrapping_add(2);
            } else {
                let sample = decoder.imu_sample(report, 0);
                self.diagnostics.record_accel(sample.accel);
                self.state.set_imu(sample);
            }
        }

        let ts = report.timestamp();
        if self.last_dequeued == Some(ts) {
            self.diagnostics.duplicate_timestamps_dequeued += 1;
            log::warn!("Duplicate timestamp {} dequeued", ts);
        }
        self.last_dequeued = Some(ts);

        if let Some(input) = decoder.decode_input(report) {
            self.state.buttons.update(input.buttons);
            self.state.stick = input.stick;
            self.state.raw_stick = input.raw_stick;
            log::trace!("ts={} stick={:?} raw={:?}", ts, input.stick, input.raw_stick);
        }
        self.diagnostics.reports_processed += 1;
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection
    }

    /// Pressed in the most recent report, not in the one before.
    pub fn button_down(&self, button: Button) -> bool {
        self.state.buttons.pressed_this_frame(button)
    }

    pub fn button_held(&self, button: Button) -> bool {
        self.state.buttons.held(button)
    }

    /// Released in the most recent report.
    pub fn button_up(&self, button: Button) -> bool {
        self.state.buttons.released_this_frame(button)
    }

    pub fn stick(&self) -> Vector2 {
        self.state.stick
    }

    pub fn gyroscope(&self) -> Vector3 {
        self.state.gyro
    }

    pub fn accelerometer(&self) -> Vector3 {
        self.state.accel
    }

    pub fn orientation(&self) -> OrientationBasis {
        self.state.orientation
    }

    pub fn rotation_matrix(&self) -> [[f32; 3]; 3] {
        self.state.orientation.rotation_matrix()
    }

    /// [roll, pitch, yaw] in degrees.
    pub fn euler_deg(&self) -> [f32; 3] {
        self.state.orientation.euler_deg()
    }

    /// Reset orientation to identity on the next IMU sample.
    pub fn recenter(&mut self) {
        self.filter.recenter();
    }

    pub fn filter_coefficient(&self) -> f32 {
        self.filter.coefficient()
    }

    pub fn set_filter_coefficient(&mut self, coefficient: f32) {
        self.config.filter_coefficient = coefficient;
        self.filter.set_coefficient(coefficient);
    }

    /// Calibration read at the last attach.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.decoder.as_ref().map(ReportDecoder::calibration)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            duplicate_timestamps_enqueued: self.enqueue_duplicates.load(Ordering::Relaxed),
            ..self.diagnostics
        }
    }
}

impl<T: Transport> Drop for Controller<T> {
    fn drop(&mut self) {
        self.detach();
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = transport.close() {
            log::warn!("Failed to close transport: {}", e);
        }
    }
}

/// Attach a controller and start a background poller for it.
pub fn attach_with_poller<T: Transport + 'static>(
    controller: &mut Controller<T>,
    leds: PlayerLeds,
) -> Result<PollerHandle> {
    controller.attach(leds)?;
    match controller.poller().and_then(Poller::spawn) {
        Ok(handle) => Ok(handle),
        Err(e) => {
            controller.detach();
            Err(e)
        }
    }
}
