//! Session lifecycle.
//!
//! A [`System`] owns at most one session at a time. `load` builds it from a
//! program file, `run_loop` drives one scheduling step per call, and
//! `shutdown` tears everything down in reverse order of construction:
//!
//! memory, clock, kernel, cores, hardware, DSP, RPC server, service manager,
//! archive manager, GDB stub, video, cheat engine, custom texture cache.

use crate::control::{SessionControl, SharedSessionControl};
use crate::cpu::VirtualCore;
use crate::error::{ResultStatus, SystemError};
use crate::kernel::KernelConfig;
use crate::loader::Loader;
use crate::perf_stats::{FrameLimiter, PerfResults, PerfStats};
use crate::platform::{GameInfo, Platform};
use crate::scheduler::{Machine, SchedulerConfig, StepReport};
use crate::settings::{Settings, TitleOverrides, format_program_id};
use crate::subsystem::{SubsystemKind, SubsystemStack};
use crate::telemetry::{FieldType, TelemetrySession};
use crate::timing::GlobalClock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Subsystems brought up during init, after the scheduled machine.
const INIT_SUBSYSTEMS: [SubsystemKind; 6] = [
    SubsystemKind::Dsp,
    SubsystemKind::RpcServer,
    SubsystemKind::ServiceManager,
    SubsystemKind::ArchiveManager,
    SubsystemKind::GdbStub,
    SubsystemKind::Video,
];

/// Subsystems brought up once the program is loaded.
const LOAD_SUBSYSTEMS: [SubsystemKind; 2] = [SubsystemKind::CheatEngine, SubsystemKind::CustomTexCache];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Collaborators are up but no program is loaded.
    Initialized,
    Running,
    /// A shutdown request was consumed; the caller must not keep stepping.
    ShutdownRequested,
}

struct Session {
    settings: Settings,
    memory: SubsystemStack,
    machine: Machine,
    subsystems: SubsystemStack,
    telemetry: TelemetrySession,
    perf_stats: PerfStats,
    loader: Option<Box<dyn Loader>>,
    program_id: Option<u64>,
    last_step: Option<StepReport>,
}

/// Session owner and lifecycle controller.
pub struct System<P: Platform> {
    platform: P,
    settings: Settings,
    scheduler_config: SchedulerConfig,
    overrides: TitleOverrides,
    control: SharedSessionControl,
    frame_limiter: FrameLimiter,
    session: Option<Session>,
    state: SessionState,
    status: ResultStatus,
    filepath: Option<PathBuf>,
}

impl<P: Platform> System<P> {
    pub fn new(platform: P, settings: Settings) -> Self {
        let frame_limiter = FrameLimiter::new(settings.use_frame_limit, settings.frame_limit);
        Self {
            platform,
            settings,
            scheduler_config: SchedulerConfig::default(),
            overrides: TitleOverrides::builtin(),
            control: Arc::new(SessionControl::new()),
            frame_limiter,
            session: None,
            state: SessionState::Uninitialized,
            status: ResultStatus::Success,
            filepath: None,
        }
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    pub fn with_overrides(mut self, overrides: TitleOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Handle for raising reset and shutdown requests from other threads.
    pub fn control(&self) -> SharedSessionControl {
        Arc::clone(&self.control)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Settings the user configured.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings in effect for the running session, title overrides included.
    pub fn session_settings(&self) -> Option<&Settings> {
        self.session.as_ref().map(|s| &s.settings)
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.session.as_ref().map(|s| &s.machine)
    }

    pub fn machine_mut(&mut self) -> Option<&mut Machine> {
        self.session.as_mut().map(|s| &mut s.machine)
    }

    pub fn program_id(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.program_id)
    }

    pub fn last_step(&self) -> Option<&StepReport> {
        self.session.as_ref().and_then(|s| s.last_step.as_ref())
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.as_deref()
    }

    /// Subsystems currently up, in bring-up order.
    pub fn subsystems(&self) -> Vec<SubsystemKind> {
        match &self.session {
            Some(session) => {
                let mut kinds = session.memory.kinds();
                kinds.extend(session.subsystems.kinds());
                kinds
            }
            None => Vec::new(),
        }
    }

    /// Load `path` into a fresh session. On failure the session is torn down
    /// and the system is left uninitialized. Requests left over from an
    /// earlier session are dropped.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SystemError> {
        self.control.clear();
        self.load_session(path.as_ref())
    }

    fn load_session(&mut self, path: &Path) -> Result<(), SystemError> {
        if self.session.is_some() {
            self.shutdown();
        }
        self.filepath = Some(path.to_path_buf());

        match self.try_load(path) {
            Ok(()) => {
                self.status = ResultStatus::Success;
                self.state = SessionState::Running;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load {}: {}", path.display(), e);
                self.shutdown();
                self.status = e.status();
                Err(e)
            }
        }
    }

    fn try_load(&mut self, path: &Path) -> Result<(), SystemError> {
        let mut loader = self.platform.get_loader(path).ok_or_else(|| SystemError::GetLoader {
            path: path.to_path_buf(),
        })?;
        let system_mode = loader.load_kernel_system_mode().map_err(SystemError::from_system_mode)?;
        let n3ds_mode = match loader.load_kernel_n3ds_mode() {
            Ok(mode) => mode,
            Err(e) => panic!("loader reported system mode {} but no New 3DS mode: {}", system_mode, e),
        };

        self.init(system_mode, n3ds_mode)?;

        let Self {
            platform,
            overrides,
            frame_limiter,
            session,
            ..
        } = self;
        let session = session.as_mut().ok_or(SystemError::NotInitialized)?;

        session.telemetry.add_initial_info(path, loader.image());
        let process = loader.load().map_err(SystemError::from_load)?;
        session.machine.kernel_mut().set_current_process(process);

        match loader.read_program_id() {
            Ok(program_id) => {
                session
                    .telemetry
                    .add_field(FieldType::App, "ProgramId", format_program_id(program_id));
                if let Some(entry) = overrides.lookup(program_id) {
                    log::info!(
                        "Applying overrides for {} ({})",
                        format_program_id(program_id),
                        entry.name.as_deref().unwrap_or("unnamed")
                    );
                    session.settings.apply(&entry.settings);
                }
                session.program_id = Some(program_id);
            }
            Err(e) => log::error!("Failed to find program id for {}: {}", path.display(), e),
        }

        for kind in LOAD_SUBSYSTEMS {
            let subsystem = platform.create_subsystem(kind, &session.settings);
            session.subsystems.bring_up(subsystem)?;
        }
        session.loader = Some(loader);

        // Reset counters and take the current frame as the time origin.
        session.perf_stats = PerfStats::new();
        frame_limiter.reset();
        session.perf_stats.begin_system_frame();
        Ok(())
    }

    fn init(&mut self, system_mode: u32, n3ds_mode: u8) -> Result<(), SystemError> {
        let settings = self.settings.clone();
        let num_cores = settings.num_cores();

        let mut memory = SubsystemStack::new();
        memory.bring_up(self.platform.create_subsystem(SubsystemKind::Memory, &settings))?;

        let clock = GlobalClock::new();
        let kernel = self.platform.create_kernel(&KernelConfig {
            system_mode,
            n3ds_mode,
            num_cores,
        });
        let backend = settings.backend_kind();
        let cores = (0..num_cores)
            .map(|id| VirtualCore::new(id, self.platform.create_cpu(id, backend)))
            .collect();
        let mut hardware = self.platform.create_hardware();
        hardware.init();
        let machine = Machine::new(clock, cores, kernel, hardware, self.scheduler_config);

        let mut telemetry = TelemetrySession::new();
        telemetry.add_field(FieldType::UserConfig, "Core_UseCpuJit", settings.use_cpu_jit);
        telemetry.add_field(FieldType::UserConfig, "System_IsNew3ds", settings.is_new_3ds);
        telemetry.add_field(FieldType::Session, "Core_Backend", backend.to_string());

        let session = self.session.insert(Session {
            settings,
            memory,
            machine,
            subsystems: SubsystemStack::new(),
            telemetry,
            perf_stats: PerfStats::new(),
            loader: None,
            program_id: None,
            last_step: None,
        });
        self.state = SessionState::Initialized;

        for kind in INIT_SUBSYSTEMS {
            let subsystem = self.platform.create_subsystem(kind, &session.settings);
            session.subsystems.bring_up(subsystem)?;
        }

        log::debug!("Initialized OK ({} cores, {} backend)", num_cores, backend);
        Ok(())
    }

    /// Run one scheduling step, then act on pending reset or shutdown requests.
    pub fn run_loop(&mut self) -> ResultStatus {
        if self.state != SessionState::Running {
            return ResultStatus::ErrorNotInitialized;
        }
        let Some(session) = self.session.as_mut() else {
            return ResultStatus::ErrorNotInitialized;
        };
        session.last_step = Some(session.machine.step());

        if self.control.take_reset() {
            if let Err(e) = self.reset() {
                log::error!("Reset failed: {}", e);
            }
        } else if self.control.take_shutdown() {
            self.state = SessionState::ShutdownRequested;
            return ResultStatus::ShutdownRequested;
        }
        self.status
    }

    pub fn single_step(&mut self) -> ResultStatus {
        self.run_loop()
    }

    /// Shut down and load the same program again.
    ///
    /// This rebuilds the session from scratch instead of resetting state in
    /// place.
    pub fn reset(&mut self) -> Result<(), SystemError> {
        let path = self.filepath.clone().ok_or(SystemError::NotInitialized)?;
        self.shutdown();
        self.load_session(&path)
    }

    /// Flush final statistics, release the session in reverse construction
    /// order and tell the room we left. Does nothing without a session.
    pub fn shutdown(&mut self) {
        self.state = SessionState::Uninitialized;
        let Some(session) = self.session.take() else {
            return;
        };
        let Session {
            memory: mut memory_stack,
            machine,
            mut subsystems,
            mut telemetry,
            mut perf_stats,
            loader,
            program_id,
            ..
        } = session;

        let perf = perf_stats.get_and_reset_stats(machine.clock().global_time_us());
        telemetry.add_field(
            FieldType::Performance,
            "Shutdown_EmulationSpeed",
            perf.emulation_speed * 100.0,
        );
        telemetry.add_field(FieldType::Performance, "Shutdown_Framerate", perf.game_fps);
        telemetry.add_field(FieldType::Performance, "Shutdown_Frametime", perf.frametime * 1000.0);
        telemetry.add_field(FieldType::Performance, "Mean_Frametime_MS", 20.0);
        self.platform.submit_telemetry(telemetry.finalize());

        subsystems.shutdown_all();
        machine.shutdown();
        memory_stack.shutdown_all();
        drop(loader);

        if let Some(room) = self.platform.room_member() {
            room.send_game_info(GameInfo::default());
        }
        log::debug!(
            "Shutdown OK{}",
            program_id
                .map(|id| format!(" ({})", format_program_id(id)))
                .unwrap_or_default()
        );
    }

    /// Video hook for the end of a presented frame: close the frame, pace the
    /// host, open the next one.
    pub fn frame_presented(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.perf_stats.end_system_frame();
        self.frame_limiter
            .do_frame_limiting(session.machine.clock().global_time_us());
        session.perf_stats.begin_system_frame();
    }

    /// The guest finished rendering a frame.
    pub fn game_frame_presented(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.perf_stats.end_game_frame();
        }
    }

    pub fn get_and_reset_perf_stats(&mut self) -> Option<PerfResults> {
        let session = self.session.as_mut()?;
        let now_us = session.machine.clock().global_time_us();
        Some(session.perf_stats.get_and_reset_stats(now_us))
    }

    /// Flag the running core for a thread switch at the end of the step.
    pub fn prepare_reschedule(&mut self) {
        if let Some(machine) = self.machine_mut() {
            machine.prepare_reschedule();
        }
    }
}

impl<P: Platform> Drop for System<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{BackendKind, CoreId, CpuBackend};
    use crate::error::{LoaderError, SubsystemError};
    use crate::headless::{HeadlessCpu, HeadlessKernel, HeadlessPlatform};
    use crate::kernel::{Kernel, Process};
    use crate::loader::{FileType, test_images};
    use crate::platform::{Hardware, RoomMember};
    use crate::subsystem::Subsystem;
    use crate::telemetry::{FieldValue, TelemetryField};
    use std::io::Write;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    struct Recorded {
        kind: SubsystemKind,
        fail: Option<fn() -> SubsystemError>,
        journal: Journal,
    }

    impl Subsystem for Recorded {
        fn kind(&self) -> SubsystemKind {
            self.kind
        }

        fn init(&mut self) -> Result<(), SubsystemError> {
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            self.journal.lock().unwrap().push(format!("init {}", self.kind));
            Ok(())
        }

        fn shutdown(&mut self) {
            self.journal.lock().unwrap().push(format!("shutdown {}", self.kind));
        }
    }

    struct RecordedHardware(Journal);

    impl Hardware for RecordedHardware {
        fn init(&mut self) {
            self.0.lock().unwrap().push("init hardware".into());
        }

        fn update(&mut self) {}

        fn shutdown(&mut self) {
            self.0.lock().unwrap().push("shutdown hardware".into());
        }
    }

    struct RecordedKernel {
        inner: HeadlessKernel,
        journal: Journal,
    }

    impl Kernel for RecordedKernel {
        fn set_running_core(&mut self, core: CoreId) {
            self.inner.set_running_core(core);
        }

        fn thread_manager(&mut self, core: CoreId) -> &mut dyn crate::kernel::ThreadManager {
            self.inner.thread_manager(core)
        }

        fn set_current_process(&mut self, process: Process) {
            self.journal.lock().unwrap().push(format!("process {}", process.name));
            self.inner.set_current_process(process);
        }

        fn shutdown(&mut self) {
            self.journal.lock().unwrap().push("shutdown kernel".into());
        }
    }

    struct Room(Journal);

    impl RoomMember for Room {
        fn send_game_info(&mut self, info: GameInfo) {
            self.0.lock().unwrap().push(format!("room {:?}", info.name));
        }
    }

    /// Loader whose every answer is scripted.
    struct FakeLoader {
        system_mode: Result<u32, fn() -> LoaderError>,
        n3ds_mode: Result<u8, fn() -> LoaderError>,
        load: Result<(), fn() -> LoaderError>,
        program_id: Option<u64>,
    }

    impl Loader for FakeLoader {
        fn file_type(&self) -> FileType {
            FileType::Cxi
        }

        fn load_kernel_system_mode(&mut self) -> Result<u32, LoaderError> {
            self.system_mode.map_err(|e| e())
        }

        fn load_kernel_n3ds_mode(&mut self) -> Result<u8, LoaderError> {
            self.n3ds_mode.map_err(|e| e())
        }

        fn load(&mut self) -> Result<Process, LoaderError> {
            self.load.map_err(|e| e())?;
            Ok(Process {
                name: "fake".into(),
                entry_point: 0x100000,
                segments: 1,
            })
        }

        fn read_program_id(&mut self) -> Result<u64, LoaderError> {
            self.program_id.ok_or(LoaderError::NotImplemented)
        }
    }

    fn good_loader() -> FakeLoader {
        FakeLoader {
            system_mode: Ok(2),
            n3ds_mode: Ok(0),
            load: Ok(()),
            program_id: Some(0x0004000000068B00),
        }
    }

    /// Platform that records lifecycle calls and serves scripted loaders.
    struct TestPlatform {
        journal: Journal,
        loaders: Vec<FakeLoader>,
        failing: Option<(SubsystemKind, fn() -> SubsystemError)>,
        telemetry: Vec<TelemetryField>,
        room: Room,
    }

    impl TestPlatform {
        fn new(loaders: Vec<FakeLoader>) -> Self {
            let journal = Journal::default();
            Self {
                room: Room(Arc::clone(&journal)),
                journal,
                loaders,
                failing: None,
                telemetry: Vec::new(),
            }
        }
    }

    impl Platform for TestPlatform {
        fn create_kernel(&mut self, config: &KernelConfig) -> Box<dyn Kernel> {
            self.journal.lock().unwrap().push(format!("kernel {} cores", config.num_cores));
            Box::new(RecordedKernel {
                inner: HeadlessKernel::new(*config),
                journal: Arc::clone(&self.journal),
            })
        }

        fn create_cpu(&mut self, core: CoreId, kind: BackendKind) -> Box<dyn CpuBackend> {
            self.journal.lock().unwrap().push(format!("cpu {}", core));
            Box::new(HeadlessCpu::new(core, kind, 2))
        }

        fn create_hardware(&mut self) -> Box<dyn Hardware> {
            Box::new(RecordedHardware(Arc::clone(&self.journal)))
        }

        fn create_subsystem(&mut self, kind: SubsystemKind, _settings: &Settings) -> Box<dyn Subsystem> {
            let fail = self.failing.filter(|(k, _)| *k == kind).map(|(_, f)| f);
            Box::new(Recorded {
                kind,
                fail,
                journal: Arc::clone(&self.journal),
            })
        }

        fn get_loader(&mut self, path: &Path) -> Option<Box<dyn Loader>> {
            if path.to_str() == Some("bad.file") || self.loaders.is_empty() {
                return None;
            }
            Some(Box::new(self.loaders.remove(0)))
        }

        fn submit_telemetry(&mut self, fields: Vec<TelemetryField>) {
            self.journal.lock().unwrap().push("telemetry".into());
            self.telemetry = fields;
        }

        fn room_member(&mut self) -> Option<&mut dyn RoomMember> {
            Some(&mut self.room)
        }
    }

    fn settings() -> Settings {
        Settings {
            use_cpu_jit: false,
            use_frame_limit: false,
            ..Settings::default()
        }
    }

    fn system(loaders: Vec<FakeLoader>) -> System<TestPlatform> {
        System::new(TestPlatform::new(loaders), settings())
    }

    #[test]
    fn test_load_without_loader() {
        let mut system = system(vec![]);
        let err = system.load("bad.file").unwrap_err();

        assert_eq!(err.status(), ResultStatus::ErrorGetLoader);
        assert_eq!(system.status(), ResultStatus::ErrorGetLoader);
        assert_eq!(system.state(), SessionState::Uninitialized);
        assert!(system.machine().is_none());
        assert!(system.subsystems().is_empty());
        assert!(entries(&system.platform().journal).is_empty());
        assert_eq!(system.run_loop(), ResultStatus::ErrorNotInitialized);
    }

    #[test]
    fn test_load_builds_session() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();

        assert_eq!(system.state(), SessionState::Running);
        assert_eq!(system.status(), ResultStatus::Success);
        assert_eq!(system.machine().unwrap().num_cores(), 2);
        assert_eq!(system.program_id(), Some(0x0004000000068B00));
        assert_eq!(
            system.subsystems(),
            vec![
                SubsystemKind::Memory,
                SubsystemKind::Dsp,
                SubsystemKind::RpcServer,
                SubsystemKind::ServiceManager,
                SubsystemKind::ArchiveManager,
                SubsystemKind::GdbStub,
                SubsystemKind::Video,
                SubsystemKind::CheatEngine,
                SubsystemKind::CustomTexCache,
            ]
        );

        let effective = system.session_settings().unwrap();
        assert!(effective.display_transfer_hack);
        assert!(!effective.texture_load_hack);
        assert!(!system.settings().display_transfer_hack);
    }

    #[test]
    fn test_new_3ds_has_four_cores() {
        let mut system = System::new(
            TestPlatform::new(vec![good_loader()]),
            Settings {
                is_new_3ds: true,
                ..settings()
            },
        );
        system.load("game.cxi").unwrap();
        assert_eq!(system.machine().unwrap().num_cores(), 4);
    }

    #[test]
    fn test_system_mode_errors_are_translated() {
        let cases: [(fn() -> LoaderError, ResultStatus); 3] = [
            (|| LoaderError::Encrypted, ResultStatus::ErrorLoaderEncrypted),
            (|| LoaderError::InvalidFormat, ResultStatus::ErrorLoaderInvalidFormat),
            (|| LoaderError::NotImplemented, ResultStatus::ErrorSystemMode),
        ];
        for (error, status) in cases {
            let loader = FakeLoader {
                system_mode: Err(error),
                ..good_loader()
            };
            let mut system = system(vec![loader]);
            assert_eq!(system.load("game.cxi").unwrap_err().status(), status);
            assert_eq!(system.state(), SessionState::Uninitialized);
            assert!(system.machine().is_none());
        }
    }

    #[test]
    #[should_panic(expected = "no New 3DS mode")]
    fn test_missing_n3ds_mode_after_system_mode_halts() {
        let loader = FakeLoader {
            n3ds_mode: Err(|| LoaderError::NotImplemented),
            ..good_loader()
        };
        let mut system = system(vec![loader]);
        let _ = system.load("game.cxi");
    }

    #[test]
    fn test_failed_image_load_tears_down() {
        let loader = FakeLoader {
            load: Err(|| LoaderError::Malformed("truncated".into())),
            ..good_loader()
        };
        let mut system = system(vec![loader]);
        let err = system.load("game.cxi").unwrap_err();

        assert_eq!(err.status(), ResultStatus::ErrorLoader);
        assert_eq!(system.state(), SessionState::Uninitialized);
        assert!(system.subsystems().is_empty());
        let journal = entries(&system.platform().journal);
        assert_eq!(journal.last().map(String::as_str), Some("room \"\""));
        assert!(journal.contains(&"shutdown memory".to_string()));
    }

    #[test]
    fn test_video_failure_reports_video_status() {
        let mut platform = TestPlatform::new(vec![good_loader()]);
        platform.failing = Some((SubsystemKind::Video, || SubsystemError::VideoCoreBelowGl33));
        let mut system = System::new(platform, settings());

        let err = system.load("game.cxi").unwrap_err();
        assert_eq!(err.status(), ResultStatus::ErrorVideoCoreBelowGl33);
        assert_eq!(system.status(), ResultStatus::ErrorVideoCoreBelowGl33);
        assert_eq!(system.state(), SessionState::Uninitialized);

        let journal = entries(&system.platform().journal);
        assert!(!journal.contains(&"init video core".to_string()));
        assert!(!journal.contains(&"shutdown video core".to_string()));
        assert!(journal.contains(&"shutdown gdb stub".to_string()));
    }

    #[test]
    fn test_shutdown_reverses_construction() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();
        system.platform().journal.lock().unwrap().clear();

        system.shutdown();

        assert_eq!(
            entries(&system.platform().journal),
            vec![
                "telemetry",
                "shutdown custom texture cache",
                "shutdown cheat engine",
                "shutdown video core",
                "shutdown gdb stub",
                "shutdown archive manager",
                "shutdown service manager",
                "shutdown rpc server",
                "shutdown dsp",
                "shutdown hardware",
                "shutdown kernel",
                "shutdown memory",
                "room \"\"",
            ]
        );
        assert_eq!(system.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_construction_order() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();

        let journal = entries(&system.platform().journal);
        let order: Vec<&str> = journal.iter().map(String::as_str).collect();
        assert_eq!(
            &order[..6],
            &["init memory", "kernel 2 cores", "cpu 0", "cpu 1", "init hardware", "init dsp"]
        );
        let video = order.iter().position(|e| *e == "init video core").unwrap();
        let process = order.iter().position(|e| *e == "process fake").unwrap();
        let cheats = order.iter().position(|e| *e == "init cheat engine").unwrap();
        assert!(video < process && process < cheats);
    }

    #[test]
    fn test_shutdown_flushes_performance_telemetry() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();
        for _ in 0..3 {
            system.run_loop();
        }
        system.frame_presented();
        system.shutdown();

        let fields = &system.platform().telemetry;
        let value = |name: &str| fields.iter().find(|f| f.name == name).map(|f| f.value.clone());
        assert_eq!(value("Mean_Frametime_MS"), Some(FieldValue::F64(20.0)));
        assert!(value("Shutdown_EmulationSpeed").is_some());
        assert!(value("Shutdown_Framerate").is_some());
        assert!(value("Shutdown_Frametime").is_some());
        assert_eq!(
            value("ProgramId"),
            Some(FieldValue::Str("0004000000068B00".into()))
        );
        assert_eq!(value("Program_Path"), Some(FieldValue::Str("game.cxi".into())));
    }

    #[test]
    fn test_shutdown_request_is_consumed_once() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();
        assert_eq!(system.run_loop(), ResultStatus::Success);

        let control = system.control();
        std::thread::spawn(move || control.request_shutdown()).join().unwrap();

        assert_eq!(system.run_loop(), ResultStatus::ShutdownRequested);
        assert_eq!(system.state(), SessionState::ShutdownRequested);
        assert_eq!(system.run_loop(), ResultStatus::ErrorNotInitialized);
        assert_eq!(system.run_loop(), ResultStatus::ErrorNotInitialized);
        assert!(!system.control().is_shutdown_requested());
    }

    #[test]
    fn test_reset_request_reloads_same_program() {
        let mut system = system(vec![good_loader(), good_loader()]);
        system.load("game.cxi").unwrap();
        for _ in 0..5 {
            system.run_loop();
        }
        assert!(system.machine().unwrap().clock().ticks() > 0);

        system.control().request_reset();
        assert_eq!(system.run_loop(), ResultStatus::Success);

        assert_eq!(system.state(), SessionState::Running);
        assert_eq!(system.filepath(), Some(Path::new("game.cxi")));
        assert_eq!(system.machine().unwrap().clock().ticks(), 0);
        assert!(system.platform().loaders.is_empty());
    }

    #[test]
    fn test_shutdown_survives_reset_in_same_step() {
        let mut system = system(vec![good_loader(), good_loader()]);
        system.load("game.cxi").unwrap();

        let control = system.control();
        control.request_reset();
        control.request_shutdown();

        assert_eq!(system.run_loop(), ResultStatus::Success);
        assert_eq!(system.state(), SessionState::Running);
        assert!(system.control().is_shutdown_requested());
        assert_eq!(system.run_loop(), ResultStatus::ShutdownRequested);
        assert_eq!(system.state(), SessionState::ShutdownRequested);
    }

    #[test]
    fn test_load_drops_stale_requests() {
        let mut system = system(vec![good_loader()]);
        system.control().request_shutdown();
        system.load("game.cxi").unwrap();
        assert!(!system.control().is_shutdown_requested());
        assert_eq!(system.run_loop(), ResultStatus::Success);
    }

    #[test]
    fn test_reset_without_program() {
        let mut system = system(vec![]);
        assert!(matches!(system.reset(), Err(SystemError::NotInitialized)));
    }

    #[test]
    fn test_run_loop_advances_time() {
        let mut system = system(vec![good_loader()]);
        system.load("game.cxi").unwrap();

        let mut previous = 0;
        for _ in 0..10 {
            assert_eq!(system.single_step(), ResultStatus::Success);
            let ticks = system.machine().unwrap().clock().ticks();
            assert!(ticks >= previous);
            previous = ticks;
        }
        assert!(previous > 0);
        assert!(system.last_step().is_some());
    }

    #[test]
    fn test_missing_program_id_is_tolerated() {
        let loader = FakeLoader {
            program_id: None,
            ..good_loader()
        };
        let mut system = system(vec![loader]);
        system.load("game.cxi").unwrap();
        assert_eq!(system.program_id(), None);
        assert!(!system.session_settings().unwrap().display_transfer_hack);
    }

    #[test]
    fn test_headless_elf_session() {
        let mut file = tempfile::Builder::new().suffix(".elf").tempfile().unwrap();
        file.write_all(&test_images::arm_elf()).unwrap();
        file.flush().unwrap();

        let mut system = System::new(HeadlessPlatform::new(), settings());
        system.load(file.path()).unwrap();
        for _ in 0..8 {
            assert_eq!(system.run_loop(), ResultStatus::Success);
        }
        let machine = system.machine().unwrap();
        assert!(machine.core(0).unwrap().runs() > 0);
        assert!(machine.core(1).unwrap().idles() > 0);

        system.shutdown();
        assert_eq!(system.platform().hardware_updates(), 8);
        assert!(
            system
                .platform()
                .last_telemetry()
                .iter()
                .any(|f| f.name == "Program_Sha256")
        );
    }
}
