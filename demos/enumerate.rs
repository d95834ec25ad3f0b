//! List all connected Joy-Con halves.

fn main() {
    env_logger::init();

    match joycon::list_devices() {
        Ok(devices) => {
            println!("Found {} Joy-Con(s):", devices.len());
            for (i, dev) in devices.iter().enumerate() {
                println!(
                    "  [{}] {:?}  PID={:04x}  Serial={}  Path={}",
                    i,
                    dev.handedness,
                    dev.product_id,
                    dev.serial,
                    dev.path.to_string_lossy()
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
