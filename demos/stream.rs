//! Stream stick, buttons and orientation from a Joy-Con to stdout.
//!
//! Usage: cargo run --example stream
//! Press Home to recenter, Ctrl+C to stop.

use joycon::{Button, Controller, ControllerConfig, JoyConError, PlayerLeds};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let mut controller = match Controller::open_first(None, ControllerConfig::from_env()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };

    let poller = match joycon::controller::attach_with_poller(&mut controller, PlayerLeds::PLAYER_1) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to attach: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming {:?} Joy-Con (Ctrl+C to stop)...", controller.handedness());

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match controller.update() {
            Ok(n) => count += n as u64,
            Err(JoyConError::ConnectionDropped) => {
                eprintln!("Connection lost. Is the Joy-Con connected?");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        for button in Button::ALL {
            if controller.button_down(button) {
                println!("  {} down", button.name());
            }
            if controller.button_up(button) {
                println!("  {} up", button.name());
            }
        }
        if controller.button_down(Button::Home) {
            controller.recenter();
        }

        // Report every second
        let now = Instant::now();
        if now.duration_since(last_report) >= Duration::from_secs(1) {
            let s = controller.stick();
            let e = controller.euler_deg();
            let elapsed = start.elapsed().as_secs_f64();
            println!(
                "stick=[{:+.3}, {:+.3}]  rpy=[{:+7.1}, {:+7.1}, {:+7.1}]  ({:.1} reports/s)",
                s.x,
                s.y,
                e[0],
                e[1],
                e[2],
                count as f64 / elapsed
            );
            last_report = now;
        }

        std::thread::sleep(Duration::from_millis(16));
    }

    poller.stop();
    controller.detach();

    let d = controller.diagnostics();
    println!(
        "\nTotal: {} reports, {} duplicate timestamps, peak accel {:?}",
        d.reports_processed,
        d.duplicate_timestamps_enqueued + d.duplicate_timestamps_dequeued,
        d.peak_accel
    );
}
