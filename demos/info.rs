//! Attach to the first connected Joy-Con and print its flash calibration.

use joycon::{Controller, ControllerConfig, PlayerLeds};

fn main() {
    env_logger::init();

    let mut controller = match Controller::open_first(None, ControllerConfig::from_env()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.attach(PlayerLeds::FLASH_1 | PlayerLeds::FLASH_4) {
        eprintln!("Attach failed: {}", e);
        std::process::exit(1);
    }

    println!("Half:     {:?}", controller.handedness());
    if let Some(cal) = controller.calibration() {
        let stick = &cal.stick;
        println!("Stick calibration ({:?}):", stick.source);
        println!("  center:           {:?}", stick.center);
        println!("  max above center: {:?}", stick.max_above_center);
        println!("  min below center: {:?}", stick.min_below_center);
        println!("  deadzone:         {}", stick.deadzone);
        println!("Gyro neutral ({:?}): {:?}", cal.gyro.source, cal.gyro.neutral);
    }

    controller.detach();
}
