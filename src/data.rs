use bitfield::bitfield;
use const_builder::ConstBuilder;

use crate::constants::{
    DEFAULT_AMBIENT_TEMP_C, DEFAULT_HEATER_DURATION_MS, DEFAULT_HEATER_TEMP_C, GASM_VALID_MSK,
    GAS_INDEX_MSK, GAS_RANGE_MSK, HEAT_STAB_MSK, LEN_FIELD, NEW_DATA_MSK, PERIOD_POLL_US,
    VARIANT_GAS_HIGH,
};

/// A measurement result from the sensor, all zero before the first fresh read.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Measurements {
    /// new data, gas valid and heat stable bits of the field that produced this sample
    pub status: u8,
    /// heater profile the gas reading belongs to
    pub gas_index: u8,
    /// sensor side measurement counter
    pub meas_index: u8,
    /// res_heat register of the active heater profile
    pub res_heat: u8,
    /// idac_heat register of the active heater profile
    pub idac: u8,
    /// gas_wait register of the active heater profile
    pub gas_wait: u8,
    /// fine temperature shared by the pressure and humidity formulas
    pub t_fine: f32,
    /// temperature degrees C
    pub temperature_c: f32,
    /// pressure Pa
    pub pressure_pa: f32,
    /// relative humidity percent
    pub humidity_percent: f32,
    /// gas resistance Ω, 0.0 when the heater was not stable or the reading not valid
    pub gas_resistance_ohm: f32,
}

/// outcome of [`crate::Bme68x::read`]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Freshness {
    /// a new sample was latched into the measurements
    Fresh,
    /// no new data showed up, measurements still hold the previous sample
    Stale,
}

/// chip identity read during the handshake
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct DeviceInfo {
    pub chip_id: u8,
    pub variant: Variant,
}

/// BME68x variant, decides the gas register layout and formula
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[repr(u8)]
pub enum Variant {
    /// BME680
    #[default]
    GasLow = 0x00,
    /// BME688
    GasHigh = 0x01,
}

impl From<u8> for Variant {
    fn from(v: u8) -> Self {
        match v {
            VARIANT_GAS_HIGH => Self::GasHigh,
            _ => Self::GasLow,
        }
    }
}

/// Power Mode
#[derive(Debug, Eq, PartialOrd, PartialEq, Clone, Copy, Default)]
#[repr(u8)]
pub enum PowerMode {
    Sleep = 0x00,
    #[default]
    Forced = 0x01,
}

impl From<u8> for PowerMode {
    fn from(v: u8) -> PowerMode {
        match v {
            0x00 => Self::Sleep,
            // parallel mode (0x02) is not driven by this crate, anything awake counts as forced
            _ => Self::Forced,
        }
    }
}

/// Over Sampling config, shared by temperature, pressure and humidity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[repr(u8)]
pub enum Oversampling {
    /// measurement skipped
    Off = 0x00,
    #[default]
    X1 = 0x01,
    X2 = 0x02,
    X4 = 0x03,
    X8 = 0x04,
    X16 = 0x05,
}

impl From<u8> for Oversampling {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::Off,
            0x01 => Self::X1,
            0x02 => Self::X2,
            0x03 => Self::X4,
            0x04 => Self::X8,
            _ => Self::X16,
        }
    }
}

impl Oversampling {
    /// conversion cycles spent on one axis
    pub fn meas_cycles(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }
}

/// IIR Filter coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum FilterCoef {
    #[default]
    COEF_0 = 0x00,
    COEF_1 = 0x01,
    COEF_3 = 0x02,
    COEF_7 = 0x03,
    COEF_15 = 0x04,
    COEF_31 = 0x05,
    COEF_63 = 0x06,
    COEF_127 = 0x07,
}

impl From<u8> for FilterCoef {
    fn from(v: u8) -> Self {
        match v & 0x07 {
            0x00 => Self::COEF_0,
            0x01 => Self::COEF_1,
            0x02 => Self::COEF_3,
            0x03 => Self::COEF_7,
            0x04 => Self::COEF_15,
            0x05 => Self::COEF_31,
            0x06 => Self::COEF_63,
            _ => Self::COEF_127,
        }
    }
}

/// Output Data Rate (ODR), standby time between conversions in sequential mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum Odr {
    ODR_0_59_MS = 0x00,
    ODR_62_5_MS = 0x01,
    ODR_125_MS = 0x02,
    ODR_250_MS = 0x03,
    ODR_500_MS = 0x04,
    ODR_1000_MS = 0x05,
    ODR_10_MS = 0x06,
    ODR_20_MS = 0x07,
    /// no standby
    #[default]
    ODR_NONE = 0x08,
}

impl From<u8> for Odr {
    fn from(v: u8) -> Self {
        match v {
            0x00 => Self::ODR_0_59_MS,
            0x01 => Self::ODR_62_5_MS,
            0x02 => Self::ODR_125_MS,
            0x03 => Self::ODR_250_MS,
            0x04 => Self::ODR_500_MS,
            0x05 => Self::ODR_1000_MS,
            0x06 => Self::ODR_10_MS,
            0x07 => Self::ODR_20_MS,
            _ => Self::ODR_NONE,
        }
    }
}

impl Odr {
    /// (odr<2:0> in CONFIG, odr<3> in CTRL_GAS_1)
    pub(crate) fn register_bits(self) -> (u8, bool) {
        match self {
            Self::ODR_NONE => (0, true),
            other => (other as u8 & 0x07, false),
        }
    }
}

bitfield! {
    /// CTRL_GAS_0 (0x70)
    pub struct CtrlGas0(u8);
    impl Debug;

    pub u8, heat_off, set_heat_off: 3, 3;   // 0 = heater on, 1 = heater off
}

bitfield! {
    /// CTRL_GAS_1 (0x71), also carries odr<3>
    pub struct CtrlGas1(u8);
    impl Debug;

    pub u8, nb_conv, set_nb_conv: 3, 0;   // heater profile used for the next conversion
    pub u8, run_gas, set_run_gas: 5, 4;   // 0 = off, 1 = gas low, 2 = gas high
    pub bool, odr3, set_odr3: 7;          // 1 = no standby
}

bitfield! {
    /// CTRL_HUM (0x72)
    pub struct CtrlHum(u8);
    impl Debug;

    pub u8, into Oversampling, hum_os, set_hum_os: 2, 0;
}

bitfield! {
    /// CTRL_MEAS (0x74)
    pub struct CtrlMeas(u8);
    impl Debug;

    pub u8, into Oversampling, temp_os, set_temp_os: 7, 5;
    pub u8, into Oversampling, press_os, set_press_os: 4, 2;
    pub u8, into PowerMode, mode, set_mode: 1, 0;
}

bitfield! {
    /// CONFIG (0x75)
    pub struct ConfigReg(u8);
    impl Debug;

    pub u8, into FilterCoef, filter, set_filter: 4, 2;
    pub u8, odr20, set_odr20: 7, 5;
}

/// BME68x configuration: power mode, oversampling, IIR filter, output data rate and gas heater profile.
/// Uses a const builder so it can live in a `const`.
#[derive(ConstBuilder, Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub struct Bme68xConfiguration {
    #[builder(default = PowerMode::Forced)]
    pub power_mode: PowerMode,
    #[builder(default = Oversampling::X8)]
    pub over_sampling_temp: Oversampling,
    #[builder(default = Oversampling::X4)]
    pub over_sampling_press: Oversampling,
    #[builder(default = Oversampling::X2)]
    pub over_sampling_hum: Oversampling,
    #[builder(default = FilterCoef::COEF_3)]
    pub iir_filter_coef: FilterCoef,
    #[builder(default = Odr::ODR_NONE)]
    pub output_data_rate: Odr,
    /// heater target °C, capped at 400 when encoded
    #[builder(default = DEFAULT_HEATER_TEMP_C)]
    pub heater_temp_c: u16,
    /// heater on time ms, 0xfc0 and above saturate
    #[builder(default = DEFAULT_HEATER_DURATION_MS)]
    pub heater_duration_ms: u16,
    #[builder(default = true)]
    pub heater_enable: bool,
    /// only used to compute the heater resistance
    #[builder(default = DEFAULT_AMBIENT_TEMP_C)]
    pub ambient_temp_c: i8,
    #[builder(default = PERIOD_POLL_US)]
    pub poll_period_us: u32,
}

impl Default for Bme68xConfiguration {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::Forced,
            over_sampling_temp: Oversampling::X8,
            over_sampling_press: Oversampling::X4,
            over_sampling_hum: Oversampling::X2,
            iir_filter_coef: FilterCoef::COEF_3,
            output_data_rate: Odr::ODR_NONE,
            heater_temp_c: DEFAULT_HEATER_TEMP_C,
            heater_duration_ms: DEFAULT_HEATER_DURATION_MS,
            heater_enable: true,
            ambient_temp_c: DEFAULT_AMBIENT_TEMP_C,
            poll_period_us: PERIOD_POLL_US,
        }
    }
}

impl Bme68xConfiguration {
    /// conversion cycles for temperature, pressure and humidity together
    pub fn meas_cycles(&self) -> u32 {
        self.over_sampling_temp.meas_cycles()
            + self.over_sampling_press.meas_cycles()
            + self.over_sampling_hum.meas_cycles()
    }
}

/// Construction time option, applied in order on top of the defaults by
/// [`crate::Bme68x::with_settings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Address(u8),
    PollPeriod(u32),
    /// only recorded in the configuration, the sensor mode is driven by
    /// [`crate::Bme68x::set_mode`] and [`crate::Bme68x::read`]
    Mode(PowerMode),
    IirFilter(FilterCoef),
    TemperatureOversampling(Oversampling),
    PressureOversampling(Oversampling),
    HumidityOversampling(Oversampling),
    HeaterTemperature(u16),
    HeaterDuration(u16),
    AmbientTemperature(i8),
}

/// one 17 byte field data block, still raw ADC counts
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub(crate) struct FieldData {
    pub status: u8,
    pub gas_index: u8,
    pub meas_index: u8,
    pub adc_pres: u32,
    pub adc_temp: u32,
    pub adc_hum: u16,
    pub adc_gas_res: u16,
    pub gas_range: u8,
    pub gas_valid: bool,
    pub heat_stable: bool,
}

impl FieldData {
    pub fn from_bytes(buf: &[u8; LEN_FIELD], variant: Variant) -> Self {
        let adc_gas_res_low = ((buf[13] as u16) << 2) | (buf[14] >> 6) as u16;
        let adc_gas_res_high = ((buf[15] as u16) << 2) | (buf[16] >> 6) as u16;
        // gas_r_lsb of the layout in use carries range and validity bits
        let (adc_gas_res, gas_lsb) = match variant {
            Variant::GasHigh => (adc_gas_res_high, buf[16]),
            Variant::GasLow => (adc_gas_res_low, buf[14]),
        };

        FieldData {
            status: (buf[0] & NEW_DATA_MSK) | (gas_lsb & (GASM_VALID_MSK | HEAT_STAB_MSK)),
            gas_index: buf[0] & GAS_INDEX_MSK,
            meas_index: buf[1],
            adc_pres: (buf[2] as u32) << 12 | (buf[3] as u32) << 4 | (buf[4] as u32) >> 4,
            adc_temp: (buf[5] as u32) << 12 | (buf[6] as u32) << 4 | (buf[7] as u32) >> 4,
            adc_hum: (buf[8] as u16) << 8 | buf[9] as u16,
            adc_gas_res,
            gas_range: gas_lsb & GAS_RANGE_MSK,
            gas_valid: gas_lsb & GASM_VALID_MSK != 0,
            heat_stable: gas_lsb & HEAT_STAB_MSK != 0,
        }
    }

    pub fn new_data(&self) -> bool {
        self.status & NEW_DATA_MSK != 0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_window_fields_land_on_their_bits() {
        let mut ctrl_meas = CtrlMeas(0x01);
        ctrl_meas.set_temp_os(Oversampling::X8 as u8);
        ctrl_meas.set_press_os(Oversampling::X4 as u8);
        assert_eq!(ctrl_meas.0, 0b100_011_01);
        assert_eq!(ctrl_meas.temp_os(), Oversampling::X8);
        assert_eq!(ctrl_meas.mode(), PowerMode::Forced);

        let mut config = ConfigReg(0x03);
        config.set_filter(FilterCoef::COEF_3 as u8);
        config.set_odr20(Odr::ODR_20_MS as u8);
        assert_eq!(config.0, 0b111_010_11);

        let mut ctrl_gas_1 = CtrlGas1(0x00);
        let (_, odr3) = Odr::ODR_NONE.register_bits();
        ctrl_gas_1.set_odr3(odr3);
        ctrl_gas_1.set_run_gas(2);
        assert_eq!(ctrl_gas_1.0, 0xa0);
    }

    #[test]
    fn register_decoders_are_total() {
        for v in 0..=u8::MAX {
            let _ = Oversampling::from(v);
            let _ = FilterCoef::from(v);
            let _ = Odr::from(v);
            let _ = PowerMode::from(v);
            let _ = Variant::from(v);
        }
        assert_eq!(Oversampling::from(7), Oversampling::X16);
        assert_eq!(Odr::from(8), Odr::ODR_NONE);
    }

    #[test]
    fn const_builder_matches_default() {
        const CONFIG: Bme68xConfiguration = Bme68xConfiguration::builder().build();
        assert_eq!(CONFIG, Bme68xConfiguration::default());
        assert_eq!(CONFIG.meas_cycles(), 8 + 4 + 2);

        let custom = Bme68xConfiguration::builder()
            .over_sampling_hum(Oversampling::Off)
            .heater_enable(false)
            .build();
        assert_eq!(custom.over_sampling_hum, Oversampling::Off);
        assert!(!custom.heater_enable);
        assert_eq!(custom.heater_temp_c, DEFAULT_HEATER_TEMP_C);
    }

    #[test]
    fn field_data_picks_gas_layout_by_variant() {
        let mut buf = [0u8; LEN_FIELD];
        buf[0] = 0x80 | 0x02;
        buf[1] = 7;
        buf[2..5].copy_from_slice(&[0x55, 0x66, 0x70]);
        buf[5..8].copy_from_slice(&[0x7a, 0x12, 0x00]);
        buf[8..10].copy_from_slice(&[0x55, 0xf0]);
        buf[13] = 0x80; // low: 0x200
        buf[14] = 0x00 | 0x20 | 0x04; // valid, not stable, range 4
        buf[15] = 0x40; // high: 0x103
        buf[16] = 0xc0 | 0x30 | 0x0a; // valid, stable, range 10

        let low = FieldData::from_bytes(&buf, Variant::GasLow);
        assert!(low.new_data());
        assert_eq!(low.gas_index, 2);
        assert_eq!(low.meas_index, 7);
        assert_eq!(low.adc_pres, 0x55667);
        assert_eq!(low.adc_temp, 0x7a120);
        assert_eq!(low.adc_hum, 0x55f0);
        assert_eq!(low.adc_gas_res, 0x200);
        assert_eq!(low.gas_range, 4);
        assert!(low.gas_valid && !low.heat_stable);

        let high = FieldData::from_bytes(&buf, Variant::GasHigh);
        assert_eq!(high.adc_gas_res, 0x103);
        assert_eq!(high.gas_range, 10);
        assert!(high.gas_valid && high.heat_stable);
        assert_eq!(high.status, 0x80 | 0x20 | 0x10);
    }
}
