use clap::Parser;
use ctr_vm::headless::HeadlessPlatform;
use ctr_vm::scheduler::SyncMode;
use ctr_vm::settings::{Settings, TitleOverrides};
use ctr_vm::timing::{BASE_CLOCK_RATE_ARM11, Ticks, cycles_to_us};
use ctr_vm::{ResultStatus, System};
use std::path::PathBuf;

/// Emulated ticks per displayed frame (60 Hz).
const FRAME_TICKS: Ticks = (BASE_CLOCK_RATE_ARM11 / 60) as Ticks;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program image to load (ARM ELF)
    program: PathBuf,

    /// Emulate the New 3DS (4 cores)
    #[arg(long)]
    new_3ds: bool,

    /// Use the interpreter even when a JIT is available
    #[arg(long)]
    interpreter: bool,

    /// Use low-level DSP emulation
    #[arg(long)]
    dsp_lle: bool,

    /// Run the DSP on its own thread (with --dsp-lle)
    #[arg(long)]
    dsp_multithread: bool,

    /// Number of scheduling steps to run before requesting shutdown
    #[arg(long, default_value_t = 100_000)]
    steps: u64,

    /// Extra title override table (JSON), merged over the built-in one
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Disable host frame pacing
    #[arg(long)]
    unlimited: bool,

    /// Speed limit in percent of native speed
    #[arg(long, default_value_t = 100)]
    speed: u16,
}

fn print_banner() {
    const BANNER: &str = r#"
    ┌─────────────────────────────────────────────────────────────────────────┐
    │                                                                         │
    │   CTR-VM v0.1.0                                                         │
    │   Multi-core handheld scheduler (headless)                              │
    │                                                                         │
    └─────────────────────────────────────────────────────────────────────────┘
"#;
    println!("{}", BANNER);
}

fn print_section(title: &str) {
    println!("\n\x1b[1;36m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
    println!("\x1b[1;33m  ▸ {}\x1b[0m", title);
    println!("\x1b[1;36m━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\x1b[0m");
}

fn print_status(component: &str, status: &str, ok: bool) {
    let status_color = if ok { "\x1b[1;32m" } else { "\x1b[1;31m" };
    let check = if ok { "✓" } else { "✗" };
    println!("    \x1b[0;37m{:<40}\x1b[0m {}[{}] {}\x1b[0m", component, status_color, check, status);
}

fn print_info(key: &str, value: &str) {
    println!("    \x1b[0;90m├─\x1b[0m \x1b[0;37m{:<20}\x1b[0m \x1b[1;97m{}\x1b[0m", key, value);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    print_banner();

    let args = Args::parse();

    // ─── CONFIGURATION ────────────────────────────────────────────────────────
    print_section("CONFIGURATION");
    let settings = Settings {
        is_new_3ds: args.new_3ds,
        use_cpu_jit: !args.interpreter,
        enable_dsp_lle: args.dsp_lle,
        enable_dsp_lle_multithread: args.dsp_multithread,
        use_frame_limit: !args.unlimited,
        frame_limit: args.speed,
        ..Settings::default()
    };
    print_info("Model", if settings.is_new_3ds { "New 3DS" } else { "3DS" });
    print_info("Cores", &settings.num_cores().to_string());
    print_info("CPU Backend", &settings.backend_kind().to_string());
    print_info("DSP", &format!("{:?}", settings.dsp_kind()));
    print_info(
        "Frame Limit",
        &if settings.use_frame_limit {
            format!("{}%", settings.frame_limit)
        } else {
            "off".to_string()
        },
    );

    let mut overrides = TitleOverrides::builtin();
    if let Some(path) = &args.overrides {
        overrides.merge(TitleOverrides::load(path)?);
        print_info("Overrides", &path.display().to_string());
    }
    print_info("Override Entries", &overrides.len().to_string());

    // ─── PROGRAM LOADING ──────────────────────────────────────────────────────
    print_section("PROGRAM LOADING");
    print_info("Path", &args.program.display().to_string());
    let mut system = System::new(HeadlessPlatform::new(), settings).with_overrides(overrides);
    if let Err(e) = system.load(&args.program) {
        print_status("Load", &format!("{:?}", e.status()), false);
        return Err(e.into());
    }
    print_status("Load", "OK", true);
    print_info("Subsystems", &format!("{:?}", system.subsystems()));

    // ─── EXECUTION ────────────────────────────────────────────────────────────
    print_section("EXECUTION");
    let control = system.control();
    let mut next_frame = FRAME_TICKS;
    let mut catchup_steps = 0u64;
    let mut steps = 0u64;
    let status = loop {
        if steps == args.steps {
            control.request_shutdown();
        }
        let status = system.run_loop();
        steps += 1;
        if status != ResultStatus::Success {
            break status;
        }

        if system.last_step().map(|r| r.mode) == Some(SyncMode::Catchup) {
            catchup_steps += 1;
        }
        let ticks = system.machine().map(|m| m.clock().ticks()).unwrap_or(0);
        while ticks >= next_frame {
            system.game_frame_presented();
            system.frame_presented();
            next_frame += FRAME_TICKS;
        }
    };
    print_status("Run Loop", &format!("{:?}", status), !status.is_error());

    // ─── STATISTICS ───────────────────────────────────────────────────────────
    print_section("STATISTICS");
    if let Some(machine) = system.machine() {
        let ticks = machine.clock().ticks();
        print_info("Steps", &steps.to_string());
        print_info("Catch-up Steps", &catchup_steps.to_string());
        print_info("Global Ticks", &ticks.to_string());
        print_info("Emulated Time", &format!("{:.3} s", cycles_to_us(ticks) as f64 / 1e6));
        for core in machine.cores() {
            print_info(
                &format!("Core {}", core.id()),
                &format!(
                    "runs={} idles={} executed={} idled={}",
                    core.runs(),
                    core.idles(),
                    core.timer().executed_ticks(),
                    core.timer().idled_ticks()
                ),
            );
        }
    }
    if let Some(perf) = system.get_and_reset_perf_stats() {
        print_info("Speed", &format!("{:.1}%", perf.emulation_speed * 100.0));
    }

    system.shutdown();
    print_status("Shutdown", "OK", true);
    print_info("Peripheral Ticks", &system.platform().hardware_updates().to_string());
    Ok(())
}
