#![cfg_attr(not(test), no_std)]

//! Driver for the Bosch BME680 and BME688 gas, pressure, temperature and humidity sensors.
//!
//! Works over I2C or SPI on top of embedded-hal 1.0, blocking by default or
//! async with the `async` feature. Measurements are taken in forced mode:
//! [`Bme68x::read`] triggers one conversion, waits for it and latches the
//! compensated values.
//!
//! ```ignore
//! let mut sensor = Bme68x::new_i2c(i2c, DeviceAddress::Secondary, delay);
//! sensor.init_device()?;
//! if sensor.read()? == Freshness::Fresh {
//!     let m = sensor.measurements();
//!     info!("{} °C  {} Pa  {} %RH  {} Ω", m.temperature_c, m.pressure_pa, m.humidity_percent, m.gas_resistance_ohm);
//! }
//! ```

pub mod calibration;
pub mod compensation;
pub mod constants;
pub mod data;
pub mod error;
pub mod interface;

use crate::calibration::CalibrationPars;
use crate::compensation::{gas_wait, heater_resistance};
use crate::constants::{
    BME68X_CHIP_ID, DISABLE_GAS_MEAS, DISABLE_HEATER, ENABLE_GAS_MEAS_H, ENABLE_GAS_MEAS_L,
    ENABLE_HEATER, FIELD_READ_ATTEMPTS, GAS_DUR_US, LEN_COEFF1, LEN_COEFF2, LEN_COEFF_ALL,
    LEN_CONFIG, LEN_FIELD, LEN_FIELD_OFFSET, MEAS_DUR_US, MEAS_OFFSET_US, MODE_MSK, REG_CHIP_ID,
    REG_COEFF1, REG_COEFF2, REG_COEFF3, REG_CONFIG, REG_CTRL_GAS_0, REG_CTRL_GAS_1, REG_CTRL_HUM,
    REG_CTRL_MEAS, REG_GAS_WAIT0, REG_IDAC_HEAT0, REG_MEAS_STATUS_0, REG_MEM_PAGE_LOW,
    REG_RES_HEAT0, REG_VARIANT_ID, WAKE_UP_DUR_US,
};
use crate::data::{
    ConfigReg, CtrlGas0, CtrlGas1, CtrlHum, CtrlMeas, FieldData,
};

pub use crate::compensation::calc_altitude;
pub use crate::constants::DeviceAddress;
pub use crate::data::{
    Bme68xConfiguration, DeviceInfo, FilterCoef, Freshness, Measurements, Odr, Oversampling,
    PowerMode, Setting, Variant,
};
pub use crate::error::{Error, Operation, Step};
pub use crate::interface::{I2cInterface, Interface, SpiInterface};

#[cfg(not(feature = "async"))]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "async")]
use embedded_hal_async::delay::DelayNs as AsyncDelayNs;

use log::{debug, error, info, warn};


/// the BME68x device
pub struct Bme68x<I, D> {
    /// bus transport, I2C or SPI
    interface: I,
    delayer: D,
    /// I²C device address, ignored by SPI
    address: u8,
    pub device_info: DeviceInfo,
    cal_pars: CalibrationPars,
    config: Bme68xConfiguration,
    /// Some while a forced conversion is in flight, holds its duration in ms
    meas_period_ms: Option<u32>,
    measurements: Measurements,
}

impl<I2C, D> Bme68x<I2cInterface<I2C>, D> {
    /// create new BME68x driver on an I2C bus
    pub fn new_i2c(i2c: I2C, address: DeviceAddress, delayer: D) -> Self {
        let mut bme68x = Self::new(I2cInterface::new(i2c), delayer);
        bme68x.address = address.into();
        bme68x
    }
}

impl<SPI, D> Bme68x<SpiInterface<SPI>, D> {
    /// create new BME68x driver on an SPI device, chip select is handled by the `SpiDevice`
    pub fn new_spi(spi: SPI, delayer: D) -> Self {
        Self::new(SpiInterface::new(spi), delayer)
    }
}

impl<I, D> Bme68x<I, D> {
    /// create new BME68x driver with the default configuration, no bus traffic until [`Bme68x::init_device`]
    pub fn new(interface: I, delayer: D) -> Self {
        debug!("new called");
        Self::with_configuration(interface, delayer, Bme68xConfiguration::default())
    }

    pub fn with_configuration(interface: I, delayer: D, config: Bme68xConfiguration) -> Self {
        Self {
            interface,
            delayer,
            address: DeviceAddress::default().into(),
            device_info: DeviceInfo::default(),
            cal_pars: CalibrationPars::default(),
            config,
            meas_period_ms: None,
            measurements: Measurements::default(),
        }
    }

    /// create new BME68x driver, applying `settings` in order on top of the defaults
    pub fn with_settings(interface: I, delayer: D, settings: &[Setting]) -> Self {
        let mut bme68x = Self::new(interface, delayer);
        for setting in settings {
            bme68x.apply_setting(*setting);
        }
        bme68x
    }

    fn apply_setting(&mut self, setting: Setting) {
        debug!("  applying {:?}", setting);
        match setting {
            Setting::Address(address) => self.address = address,
            Setting::PollPeriod(period_us) => self.config.poll_period_us = period_us,
            Setting::Mode(mode) => self.config.power_mode = mode,
            Setting::IirFilter(coef) => self.config.iir_filter_coef = coef,
            Setting::TemperatureOversampling(os) => self.config.over_sampling_temp = os,
            Setting::PressureOversampling(os) => self.config.over_sampling_press = os,
            Setting::HumidityOversampling(os) => self.config.over_sampling_hum = os,
            Setting::HeaterTemperature(temp_c) => self.config.heater_temp_c = temp_c,
            Setting::HeaterDuration(duration_ms) => self.config.heater_duration_ms = duration_ms,
            Setting::AmbientTemperature(temp_c) => self.config.ambient_temp_c = temp_c,
        }
    }

    /// give back the bus interface
    pub fn release(self) -> I {
        self.interface
    }

    /// last latched measurement, all zero before the first fresh read
    pub fn measurements(&self) -> Measurements {
        self.measurements
    }

    /// calibration coefficients, valid after [`Bme68x::init_device`]
    pub fn calibration(&self) -> &CalibrationPars {
        &self.cal_pars
    }

    pub fn config(&self) -> Bme68xConfiguration {
        self.config
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    /// period between data ready polls, also used while waiting for sleep mode
    pub fn set_poll_period(&mut self, period_us: u32) {
        self.config.poll_period_us = period_us;
    }

    /// TPHG conversion time in µs for the current oversampling, heater time not included
    pub fn measurement_duration_us(&self) -> u32 {
        self.config.meas_cycles() * MEAS_OFFSET_US + MEAS_DUR_US + GAS_DUR_US + WAKE_UP_DUR_US
    }
}

#[maybe_async_cfg::maybe(
    sync(
        cfg(not(feature = "async")),
        self = "Bme68x",
        idents(AsyncDelayNs(sync = "DelayNs"))
    ),
    async(feature = "async", keep_self)
)]
impl<I, D, E> Bme68x<I, D>
where
    I: Interface<Error = E>,
    D: AsyncDelayNs,
{
    async fn read_register(&mut self, operation: Operation, register: u8, buffer: &mut [u8]) -> Result<(), Error<E>> {
        self.interface
            .read(self.address, register, buffer).await
            .map_err(|e| Error::Bus(operation, e))
    }

    async fn write_registers(&mut self, operation: Operation, registers: &[u8], data: &[u8]) -> Result<(), Error<E>> {
        self.interface
            .write(self.address, registers, data).await
            .map_err(|e| Error::Bus(operation, e))
    }

    /// check the chip id, soft reset, read identity and calibration, then push the configuration
    pub async fn init_device(&mut self) -> Result<(), Error<E>> {
        debug!("in init_device()");
        self.handshake().await.map_err(|e| e.during(Step::Handshake))
    }

    async fn handshake(&mut self) -> Result<(), Error<E>> {
        if !self.is_connected().await? {
            error!("BME68x not found at {:#04x}, chip id {:#04x}", self.address, self.device_info.chip_id);
            return Err(Error::NotConnected(self.device_info.chip_id));
        }
        self.reset_device().await?;
        self.get_chip_id().await?;
        self.get_variant_id().await?;
        self.read_calibration_pars().await?;
        self.apply_config().await?;
        self.apply_gas_config().await?;
        info!("BME68x ready at {:#04x}, variant {:?}", self.address, self.device_info.variant);
        Ok(())
    }

    /// true if the chip id reads back as 0x61
    pub async fn is_connected(&mut self) -> Result<bool, Error<E>> {
        debug!("in is_connected()");
        Ok(self.get_chip_id().await? == BME68X_CHIP_ID)
    }

    /// soft reset, waits for the sensor to restart
    pub async fn reset_device(&mut self) -> Result<(), Error<E>> {
        debug!("in reset_device()");
        self.interface
            .reset(self.address, &mut self.delayer).await
            .map_err(|e| Error::Bus(Operation::Reset, e))
    }

    pub async fn get_chip_id(&mut self) -> Result<u8, Error<E>> {
        debug!("in get_chip_id()");
        let mut result_buf = [0u8; 1];
        self.read_register(Operation::ReadChipId, REG_CHIP_ID, &mut result_buf).await?;
        self.device_info.chip_id = result_buf[0];
        Ok(result_buf[0])
    }

    pub async fn get_variant_id(&mut self) -> Result<Variant, Error<E>> {
        debug!("in get_variant_id()");
        let mut result_buf = [0u8; 1];
        self.read_register(Operation::ReadVariantId, REG_VARIANT_ID, &mut result_buf).await?;
        self.device_info.variant = Variant::from(result_buf[0]);
        Ok(self.device_info.variant)
    }

    /// read the three NVM windows and decode them
    pub async fn read_calibration_pars(&mut self) -> Result<(), Error<E>> {
        debug!("in read_calibration_pars()");
        let mut coeff = [0u8; LEN_COEFF_ALL];
        let (window1, rest) = coeff.split_at_mut(LEN_COEFF1);
        let (window2, window3) = rest.split_at_mut(LEN_COEFF2);
        self.read_register(Operation::ReadCalibration, REG_COEFF1, window1).await?;
        self.read_register(Operation::ReadCalibration, REG_COEFF2, window2).await?;
        self.read_register(Operation::ReadCalibration, REG_COEFF3, window3).await?;
        debug!("  calibration bytes {:?}", coeff);
        self.cal_pars = CalibrationPars::from_raw(&coeff);
        debug!("  {:?}", self.cal_pars);
        Ok(())
    }

    /// read the mode bits and record them as the intended mode
    pub async fn get_power_mode(&mut self) -> Result<PowerMode, Error<E>> {
        debug!("in get_power_mode()");
        let mut result_buf = [0u8; 1];
        self.read_register(Operation::ReadMode, REG_CTRL_MEAS, &mut result_buf).await?;
        self.config.power_mode = CtrlMeas(result_buf[0]).mode();
        Ok(self.config.power_mode)
    }

    /// Put the sensor to sleep, then switch to `mode`.
    ///
    /// Keeps forcing sleep until the sensor reports it, waiting one poll period
    /// between tries. A sensor that never reports sleep keeps this looping, use
    /// [`Bme68x::set_mode_bounded`] to give up instead.
    pub async fn set_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
        debug!("in set_mode( {:?} )", mode);
        self.change_mode(mode, None).await.map_err(|e| e.during(Step::SetMode))
    }

    /// like [`Bme68x::set_mode`] but fails with [`Error::SleepTimeout`] after `max_attempts` tries
    pub async fn set_mode_bounded(&mut self, mode: PowerMode, max_attempts: u32) -> Result<(), Error<E>> {
        debug!("in set_mode_bounded( {:?}, {} )", mode, max_attempts);
        self.change_mode(mode, Some(max_attempts)).await.map_err(|e| e.during(Step::SetMode))
    }

    async fn change_mode(&mut self, mode: PowerMode, max_attempts: Option<u32>) -> Result<(), Error<E>> {
        self.config.power_mode = mode;
        let mut attempts: u32 = 0;
        let mut ctrl_meas = loop {
            if max_attempts.is_some_and(|max| attempts >= max) {
                warn!("sensor still awake after {} attempts", attempts);
                return Err(Error::SleepTimeout);
            }
            attempts += 1;

            let mut result_buf = [0u8; 1];
            self.read_register(Operation::ReadMode, REG_CTRL_MEAS, &mut result_buf).await?;
            let mut ctrl_meas = CtrlMeas(result_buf[0]);
            if ctrl_meas.0 & MODE_MSK == PowerMode::Sleep as u8 {
                break ctrl_meas;
            }
            ctrl_meas.set_mode(PowerMode::Sleep as u8);
            self.write_registers(Operation::WriteMode, &[REG_CTRL_MEAS], &[ctrl_meas.0]).await?;
            self.delayer.delay_us(self.config.poll_period_us).await;
        };

        if mode != PowerMode::Sleep {
            ctrl_meas.set_mode(mode as u8);
            self.write_registers(Operation::WriteMode, &[REG_CTRL_MEAS], &[ctrl_meas.0]).await?;
        }
        Ok(())
    }

    /// write oversampling, IIR filter and ODR, in sleep mode, then restore the previous mode
    pub async fn apply_config(&mut self) -> Result<(), Error<E>> {
        debug!("in apply_config()");
        self.write_config_window().await.map_err(|e| e.during(Step::ApplyConfig))
    }

    async fn write_config_window(&mut self) -> Result<(), Error<E>> {
        let current_mode = self.get_power_mode().await?;
        self.set_mode(PowerMode::Sleep).await?;

        // CTRL_GAS_1, CTRL_HUM, 0x73, CTRL_MEAS, CONFIG
        let mut data = [0u8; LEN_CONFIG];
        self.read_register(Operation::ReadConfig, REG_CTRL_GAS_1, &mut data).await?;

        let (odr20, odr3) = self.config.output_data_rate.register_bits();
        let mut ctrl_gas_1 = CtrlGas1(data[0]);
        ctrl_gas_1.set_odr3(odr3);
        let mut ctrl_hum = CtrlHum(data[1]);
        ctrl_hum.set_hum_os(self.config.over_sampling_hum as u8);
        let mut ctrl_meas = CtrlMeas(data[3]);
        ctrl_meas.set_temp_os(self.config.over_sampling_temp as u8);
        ctrl_meas.set_press_os(self.config.over_sampling_press as u8);
        let mut config_reg = ConfigReg(data[4]);
        config_reg.set_filter(self.config.iir_filter_coef as u8);
        config_reg.set_odr20(odr20);

        let data = [ctrl_gas_1.0, ctrl_hum.0, data[2], ctrl_meas.0, config_reg.0];
        debug!("  config window {:?}", data);
        self.write_registers(
            Operation::WriteConfig,
            &[REG_CTRL_GAS_1, REG_CTRL_HUM, REG_MEM_PAGE_LOW, REG_CTRL_MEAS, REG_CONFIG],
            &data,
        ).await?;

        if current_mode != PowerMode::Sleep {
            self.set_mode(current_mode).await?;
        }
        Ok(())
    }

    /// write heater profile 0 and the gas control registers, leaves the sensor asleep
    pub async fn apply_gas_config(&mut self) -> Result<(), Error<E>> {
        debug!("in apply_gas_config()");
        self.write_gas_config().await.map_err(|e| e.during(Step::ApplyGasConfig))
    }

    async fn write_gas_config(&mut self) -> Result<(), Error<E>> {
        if self.config.heater_temp_c == 0 || self.config.heater_duration_ms == 0 {
            self.config.heater_enable = false;
        }
        self.set_mode(PowerMode::Sleep).await?;

        let res_heat = heater_resistance(&self.cal_pars, self.config.heater_temp_c, self.config.ambient_temp_c);
        let gas_wait = gas_wait(self.config.heater_duration_ms);
        debug!("  res_heat {:#04x}  gas_wait {:#04x}", res_heat, gas_wait);
        self.write_registers(Operation::WriteHeater, &[REG_RES_HEAT0, REG_GAS_WAIT0], &[res_heat, gas_wait]).await?;

        let mut data = [0u8; 2];
        self.read_register(Operation::ReadGasControl, REG_CTRL_GAS_0, &mut data).await?;

        let (heat_off, run_gas) = match (self.config.heater_enable, self.device_info.variant) {
            (true, Variant::GasHigh) => (ENABLE_HEATER, ENABLE_GAS_MEAS_H),
            (true, Variant::GasLow) => (ENABLE_HEATER, ENABLE_GAS_MEAS_L),
            (false, _) => (DISABLE_HEATER, DISABLE_GAS_MEAS),
        };
        let mut ctrl_gas_0 = CtrlGas0(data[0]);
        ctrl_gas_0.set_heat_off(heat_off);
        let mut ctrl_gas_1 = CtrlGas1(data[1]);
        ctrl_gas_1.set_nb_conv(0);
        ctrl_gas_1.set_run_gas(run_gas);

        self.write_registers(
            Operation::WriteGasControl,
            &[REG_CTRL_GAS_0, REG_CTRL_GAS_1],
            &[ctrl_gas_0.0, ctrl_gas_1.0],
        ).await
    }

    pub async fn set_temperature_oversampling(&mut self, os: Oversampling) -> Result<(), Error<E>> {
        debug!("in set_temperature_oversampling( {:?} )", os);
        self.config.over_sampling_temp = os;
        self.apply_config().await
    }

    pub async fn set_pressure_oversampling(&mut self, os: Oversampling) -> Result<(), Error<E>> {
        debug!("in set_pressure_oversampling( {:?} )", os);
        self.config.over_sampling_press = os;
        self.apply_config().await
    }

    pub async fn set_humidity_oversampling(&mut self, os: Oversampling) -> Result<(), Error<E>> {
        debug!("in set_humidity_oversampling( {:?} )", os);
        self.config.over_sampling_hum = os;
        self.apply_config().await
    }

    pub async fn set_iir_filter(&mut self, coef: FilterCoef) -> Result<(), Error<E>> {
        debug!("in set_iir_filter( {:?} )", coef);
        self.config.iir_filter_coef = coef;
        self.apply_config().await
    }

    pub async fn set_odr(&mut self, odr: Odr) -> Result<(), Error<E>> {
        debug!("in set_odr( {:?} )", odr);
        self.config.output_data_rate = odr;
        self.apply_config().await
    }

    /// heater target °C, on time ms and enable, a zero temperature or duration turns the heater off
    pub async fn set_gas_heater(&mut self, temp_c: u16, duration_ms: u16, enable: bool) -> Result<(), Error<E>> {
        debug!("in set_gas_heater( {}, {}, {} )", temp_c, duration_ms, enable);
        self.config.heater_temp_c = temp_c;
        self.config.heater_duration_ms = duration_ms;
        self.config.heater_enable = enable;
        self.apply_gas_config().await
    }

    pub async fn set_heater_temperature(&mut self, temp_c: u16) -> Result<(), Error<E>> {
        debug!("in set_heater_temperature( {} )", temp_c);
        self.config.heater_temp_c = temp_c;
        self.apply_gas_config().await
    }

    pub async fn set_heater_duration(&mut self, duration_ms: u16) -> Result<(), Error<E>> {
        debug!("in set_heater_duration( {} )", duration_ms);
        self.config.heater_duration_ms = duration_ms;
        self.apply_gas_config().await
    }

    pub async fn set_ambient_temperature(&mut self, temp_c: i8) -> Result<(), Error<E>> {
        debug!("in set_ambient_temperature( {} )", temp_c);
        self.config.ambient_temp_c = temp_c;
        self.apply_gas_config().await
    }

    /// Trigger a forced conversion, wait for it and latch the result.
    ///
    /// Returns [`Freshness::Stale`] when no new data showed up within the poll
    /// attempts, or when a previous read was dropped mid-conversion. The
    /// measurements are left untouched in both cases.
    pub async fn read(&mut self) -> Result<Freshness, Error<E>> {
        debug!("in read()");
        if self.meas_period_ms.take().is_some() {
            warn!("previous conversion did not complete, skipping this read");
            return Ok(Freshness::Stale);
        }
        self.run_measurement().await.map_err(|e| e.during(Step::Read))
    }

    async fn run_measurement(&mut self) -> Result<Freshness, Error<E>> {
        self.set_mode(PowerMode::Forced).await?;

        let duration_us = self.measurement_duration_us() + self.config.heater_duration_ms as u32 * 1000;
        let period_ms = duration_us / 1000;
        debug!("  conversion takes {} ms", period_ms);
        self.meas_period_ms = Some(period_ms);
        if period_ms > 0 {
            // twice the datasheet time, the sensor runs late with a cold heater
            self.delayer.delay_ms(2 * period_ms).await;
        }
        self.meas_period_ms = None;

        self.read_field_data().await
    }

    async fn read_field_data(&mut self) -> Result<Freshness, Error<E>> {
        let variant = self.device_info.variant;
        for attempt in 0..FIELD_READ_ATTEMPTS {
            let mut result_buf = [0u8; LEN_FIELD];
            let register = REG_MEAS_STATUS_0 + attempt * LEN_FIELD_OFFSET;
            self.read_register(Operation::ReadFieldData, register, &mut result_buf).await?;
            debug!("  field data at {:#04x}: {:?}", register, result_buf);

            let field = FieldData::from_bytes(&result_buf, variant);
            if field.new_data() {
                self.latch_measurements(&field).await?;
                return Ok(Freshness::Fresh);
            }
            self.delayer.delay_us(self.config.poll_period_us).await;
        }
        warn!("no new data after {} attempts, keeping the previous measurements", FIELD_READ_ATTEMPTS);
        Ok(Freshness::Stale)
    }

    async fn latch_measurements(&mut self, field: &FieldData) -> Result<(), Error<E>> {
        let mut res_heat = [0u8; 1];
        let mut idac = [0u8; 1];
        let mut gas_wait = [0u8; 1];
        self.read_register(Operation::ReadHeaterReadback, REG_RES_HEAT0 + field.gas_index, &mut res_heat).await?;
        self.read_register(Operation::ReadHeaterReadback, REG_IDAC_HEAT0 + field.gas_index, &mut idac).await?;
        self.read_register(Operation::ReadHeaterReadback, REG_GAS_WAIT0 + field.gas_index, &mut gas_wait).await?;

        let (temperature_c, t_fine) = compensation::temperature(&self.cal_pars, field.adc_temp);
        let gas_resistance_ohm = if field.heat_stable && field.gas_valid {
            match self.device_info.variant {
                Variant::GasHigh => compensation::gas_resistance_high(field.adc_gas_res, field.gas_range),
                Variant::GasLow => {
                    compensation::gas_resistance_low(&self.cal_pars, field.adc_gas_res, field.gas_range)
                }
            }
        } else {
            0.0
        };

        self.measurements = Measurements {
            status: field.status,
            gas_index: field.gas_index,
            meas_index: field.meas_index,
            res_heat: res_heat[0],
            idac: idac[0],
            gas_wait: gas_wait[0],
            t_fine,
            temperature_c,
            pressure_pa: compensation::pressure(&self.cal_pars, t_fine, field.adc_pres),
            humidity_percent: compensation::humidity(&self.cal_pars, t_fine, field.adc_hum),
            gas_resistance_ohm,
        };
        debug!("  {:?}", self.measurements);
        Ok(())
    }
}
