//! Stream Joy-Con state as JSON lines.
//!
//! Outputs one JSON object per frame:
//!
//! {"sx":0.012,"sy":-0.004,"roll":5.2,"pitch":3.1,"yaw":1.4,"gx":0.1,"gy":0.0,"gz":-0.2,"buttons":["home"]}
//!
//! Usage: cargo run --release --example stream_json

use joycon::{Button, Controller, ControllerConfig, PlayerLeds};
use std::io::{self, Write};
use std::time::Duration;

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

    eprintln!("Streaming JSON (Ctrl+C to stop)...");

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut idle_frames: u32 = 0;

    loop {
        match controller.update() {
            Ok(0) => {
                idle_frames += 1;
                if idle_frames >= 1800 {
                    eprintln!("Stopping after 30s without reports");
                    break;
                }
            }
            Ok(_) => {
                idle_frames = 0;
                let s = controller.stick();
                let e = controller.euler_deg();
                let g = controller.gyroscope();
                let held: Vec<String> = Button::ALL
                    .iter()
                    .filter(|b| controller.button_held(**b))
                    .map(|b| format!("\"{}\"", b.name()))
                    .collect();
                let _ = writeln!(
                    out,
                    "{{\"sx\":{:.3},\"sy\":{:.3},\"roll\":{:.1},\"pitch\":{:.1},\"yaw\":{:.1},\"gx\":{:.1},\"gy\":{:.1},\"gz\":{:.1},\"buttons\":[{}]}}",
                    s.x,
                    s.y,
                    e[0],
                    e[1],
                    e[2],
                    g.x,
                    g.y,
                    g.z,
                    held.join(","),
                );
                let _ = out.flush();
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    poller.stop();
    controller.detach();
}
