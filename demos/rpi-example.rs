use anyhow::Result;
use linux_embedded_hal::{Delay, I2cdev};

use bme68x_ya::{
    calc_altitude, constants::STANDARD_SEA_LEVEL_HPA, Bme68x, Bme68xConfiguration, DeviceAddress,
    FilterCoef, Freshness, I2cInterface, Oversampling,
};

use std::thread;
use std::time::Duration;

use env_logger::Builder;
use log::{info, warn, LevelFilter};
use std::io::Write;

fn main() -> Result<()> {
    let mut builder = Builder::from_default_env();

    builder
        .format(|buf, record| writeln!(buf, "{} - {}", record.level(), record.args()))
        .filter(None, LevelFilter::Info)
        .init();

    info!("Hello, linux Rust and bme68x-ya world!");

    let i2c_dev = I2cdev::new("/dev/i2c-1")?;
    let delayer = Delay {};

    let config = const {
        Bme68xConfiguration::builder()
            .over_sampling_temp(Oversampling::X2)
            .over_sampling_press(Oversampling::X16)
            .over_sampling_hum(Oversampling::X1)
            .iir_filter_coef(FilterCoef::COEF_3)
            .heater_temp_c(300)
            .heater_duration_ms(100)
            .build()
    };

    let mut sensor = Bme68x::with_configuration(I2cInterface::new(i2c_dev), delayer, config);
    sensor.set_address(DeviceAddress::Secondary.into());
    info!("created BME68x device, calling init_device next");
    sensor.init_device()?;
    info!("BME68x init_device done, {:?}", sensor.device_info);
    info!("config = {:?}", sensor.config());

    loop {
        match sensor.read()? {
            Freshness::Fresh => {
                let m = sensor.measurements();
                let pressure_hpa = m.pressure_pa / 100.0;
                info!(
                    "{:.2} °C  {:.2} hPa  {:.2} %RH  {:.0} Ω  altitude {:.1} m",
                    m.temperature_c,
                    pressure_hpa,
                    m.humidity_percent,
                    m.gas_resistance_ohm,
                    calc_altitude(STANDARD_SEA_LEVEL_HPA, pressure_hpa)
                );
            }
            Freshness::Stale => warn!("  bme68x data not ready"),
        }
        thread::sleep(Duration::from_secs(3));
    }
}
