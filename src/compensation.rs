//! Floating point compensation, after the Bosch BME68x float API.
//!
//! Everything here is pure: raw ADC counts plus [`CalibrationPars`] in,
//! physical units out. The only value carried between formulas is
//! `t_fine`, returned by [`temperature`] and fed to [`pressure`] and
//! [`humidity`].

use libm::pow;

use crate::calibration::CalibrationPars;
use crate::constants::{GAS_WAIT_MAX_MS, GAS_WAIT_SATURATED, HEATER_MAX_TEMP_C};

// gas range correction in percent, gas low variant only
const LOOKUP_K1_RANGE: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, -0.8, 0.0, 0.0, -0.2, -0.5, 0.0, -1.0, 0.0, 0.0,
];
const LOOKUP_K2_RANGE: [f32; 16] = [
    0.0, 0.0, 0.0, 0.0, 0.1, 0.7, 0.0, -0.8, -0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

/// returns (temperature in °C, t_fine)
pub fn temperature(cal: &CalibrationPars, adc_temp: u32) -> (f32, f32) {
    let adc = adc_temp as f32;
    let var1 = (adc / 16384.0 - cal.par_t1 as f32 / 1024.0) * cal.par_t2 as f32;
    let var2 = adc / 131072.0 - cal.par_t1 as f32 / 8192.0;
    let var2 = var2 * var2 * (cal.par_t3 as f32 * 16.0);
    let t_fine = var1 + var2;
    (t_fine / 5120.0, t_fine)
}

/// pressure in Pa, 0.0 when the calibration makes the divisor vanish
pub fn pressure(cal: &CalibrationPars, t_fine: f32, adc_pres: u32) -> f32 {
    let mut var1 = t_fine / 2.0 - 64000.0;
    let mut var2 = var1 * var1 * (cal.par_p6 as f32 / 131072.0);
    var2 += var1 * cal.par_p5 as f32 * 2.0;
    var2 = var2 / 4.0 + cal.par_p4 as f32 * 65536.0;
    var1 = (cal.par_p3 as f32 * var1 * var1 / 16384.0 + cal.par_p2 as f32 * var1) / 524288.0;
    var1 = (1.0 + var1 / 32768.0) * cal.par_p1 as f32;
    if var1 == 0.0 {
        return 0.0;
    }

    let mut calc_pres = 1048576.0 - adc_pres as f32;
    calc_pres = (calc_pres - var2 / 4096.0) * 6250.0 / var1;
    let var1 = cal.par_p9 as f32 * calc_pres * calc_pres / 2147483648.0;
    let var2 = calc_pres * (cal.par_p8 as f32 / 32768.0);
    let scaled = calc_pres / 256.0;
    let var3 = scaled * scaled * scaled * (cal.par_p10 as f32 / 131072.0);
    calc_pres + (var1 + var2 + var3 + cal.par_p7 as f32 * 128.0) / 16.0
}

/// relative humidity in %, clamped to 0..=100
pub fn humidity(cal: &CalibrationPars, t_fine: f32, adc_hum: u16) -> f32 {
    let temp_comp = t_fine / 5120.0;
    let var1 = adc_hum as f32 - (cal.par_h1 as f32 * 16.0 + (cal.par_h3 as f32 / 2.0) * temp_comp);
    let var2 = var1
        * ((cal.par_h2 as f32 / 262144.0)
            * (1.0
                + (cal.par_h4 as f32 / 16384.0) * temp_comp
                + (cal.par_h5 as f32 / 1048576.0) * temp_comp * temp_comp));
    let var3 = cal.par_h6 as f32 / 16384.0;
    let var4 = cal.par_h7 as f32 / 2097152.0;
    let calc_hum = var2 + (var3 + var4 * temp_comp) * var2 * var2;
    calc_hum.clamp(0.0, 100.0)
}

/// gas resistance in Ω for the gas low variant (BME680)
pub fn gas_resistance_low(cal: &CalibrationPars, adc_gas_res: u16, gas_range: u8) -> f32 {
    let gas_range = (gas_range & 0x0f) as usize;
    let gas_range_f = (1u32 << gas_range) as f32;
    let var1 = 1340.0 + 5.0 * cal.range_sw_err as f32;
    let var2 = var1 * (1.0 + LOOKUP_K1_RANGE[gas_range] / 100.0);
    let var3 = 1.0 + LOOKUP_K2_RANGE[gas_range] / 100.0;
    1.0 / (var3 * 0.000000125 * gas_range_f * ((adc_gas_res as f32 - 512.0) / var2 + 1.0))
}

/// gas resistance in Ω for the gas high variant (BME688)
pub fn gas_resistance_high(adc_gas_res: u16, gas_range: u8) -> f32 {
    let var1 = 262144u32 >> (gas_range & 0x0f);
    let var2 = (adc_gas_res as i32 - 512) * 3 + 4096;
    1000000.0 * var1 as f32 / var2 as f32
}

/// res_heat register value for a heater target in °C (capped at 400)
pub fn heater_resistance(cal: &CalibrationPars, target_temp_c: u16, ambient_temp_c: i8) -> u8 {
    let target = target_temp_c.min(HEATER_MAX_TEMP_C) as f32;

    let var1 = cal.par_gh1 as f32 / 16.0 + 49.0;
    let var2 = (cal.par_gh2 as f32 / 32768.0) * 0.0005 + 0.00235;
    let var3 = cal.par_gh3 as f32 / 1024.0;
    let var4 = var1 * (1.0 + var2 * target);
    let var5 = var4 + var3 * ambient_temp_c as f32;
    let res_heat = 3.4
        * (var5
            * (4.0 / (4.0 + cal.res_heat_range as f32))
            * (1.0 / (1.0 + cal.res_heat_val as f32 * 0.002))
            - 25.0);
    // float to int casts saturate, out of range lands on 0 or 255
    res_heat as u8
}

/// gas_wait register value for a heater duration in ms.
///
/// The register holds a 6 bit mantissa and a 2 bit multiplier exponent
/// (1, 4, 16, 64), so long durations lose precision.
pub fn gas_wait(duration_ms: u16) -> u8 {
    if duration_ms >= GAS_WAIT_MAX_MS {
        return GAS_WAIT_SATURATED;
    }
    let mut duration = duration_ms;
    let mut factor: u8 = 0;
    while duration > 0x3f {
        duration /= 4;
        factor += 1;
    }
    duration as u8 + factor * 64
}

/// duration in ms encoded by a gas_wait register value
pub fn gas_wait_duration_ms(gas_wait: u8) -> u32 {
    let mantissa = (gas_wait & 0x3f) as u32;
    let factor = (gas_wait >> 6) as u32;
    mantissa << (2 * factor)
}

/// altitude in m from sea level and measured pressure, both in hPa
pub fn calc_altitude(sea_level_hpa: f32, pressure_hpa: f32) -> f64 {
    44330.0 * (1.0 - pow(pressure_hpa as f64 / sea_level_hpa as f64, 0.1903))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STANDARD_SEA_LEVEL_HPA;

    fn sample_calibration() -> CalibrationPars {
        CalibrationPars {
            par_t1: 26304,
            par_t2: 26203,
            par_t3: 3,
            par_p1: 35910,
            par_p2: -10516,
            par_p3: 88,
            par_p4: 7198,
            par_p5: -106,
            par_p6: 30,
            par_p7: 34,
            par_p8: -1587,
            par_p9: -2690,
            par_p10: 30,
            par_h1: 794,
            par_h2: 1007,
            par_h3: 0,
            par_h4: 45,
            par_h5: 20,
            par_h6: 120,
            par_h7: -100,
            par_gh1: -19,
            par_gh2: -5195,
            par_gh3: 18,
            res_heat_range: 1,
            res_heat_val: 43,
            range_sw_err: 0,
        }
    }

    #[test]
    fn tph_regression_vector() {
        let cal = sample_calibration();
        let (celsius, t_fine) = temperature(&cal, 500_000);
        assert!((celsius - 24.7227).abs() < 0.01, "temperature {}", celsius);
        assert!((t_fine - 126580.03).abs() < 1.0, "t_fine {}", t_fine);

        let pascal = pressure(&cal, t_fine, 350_000);
        assert!((pascal - 101544.0).abs() < 2.0, "pressure {}", pascal);

        let rel_hum = humidity(&cal, t_fine, 22_000);
        assert!((rel_hum - 47.6837).abs() < 0.05, "humidity {}", rel_hum);
    }

    #[test]
    fn pressure_is_zero_when_divisor_vanishes() {
        let cal = CalibrationPars {
            par_p1: 0,
            ..sample_calibration()
        };
        assert_eq!(pressure(&cal, 126580.0, 350_000), 0.0);
    }

    #[test]
    fn humidity_is_clamped() {
        let cal = sample_calibration();
        let (_, t_fine) = temperature(&cal, 500_000);
        assert_eq!(humidity(&cal, t_fine, 0), 0.0);
        assert_eq!(humidity(&cal, t_fine, u16::MAX), 100.0);
    }

    #[test]
    fn gas_resistance_at_mid_scale() {
        let cal = sample_calibration();
        assert!((gas_resistance_high(512, 0) - 64_000_000.0).abs() < 1.0);
        assert!((gas_resistance_high(512, 4) - 4_000_000.0).abs() < 1.0);
        assert!((gas_resistance_low(&cal, 512, 0) - 8_000_000.0).abs() < 8.0);
        // range 5 carries a k2 correction of 0.7 %
        let expected = 1.0 / (1.007 * 0.000000125 * 32.0);
        assert!((gas_resistance_low(&cal, 512, 5) - expected).abs() < 1.0);
    }

    #[test]
    fn heater_resistance_is_deterministic_and_capped() {
        let cal = sample_calibration();
        let mut previous = 0u8;
        for target in 0..=HEATER_MAX_TEMP_C {
            let res_heat = heater_resistance(&cal, target, 25);
            assert_eq!(res_heat, heater_resistance(&cal, target, 25));
            assert!(res_heat >= previous, "not monotonic at {}", target);
            previous = res_heat;
        }
        assert_eq!(heater_resistance(&cal, 320, 25), 122);
        assert_eq!(heater_resistance(&cal, 400, 25), 144);
        assert_eq!(heater_resistance(&cal, 1000, 25), 144);
    }

    #[test]
    fn gas_wait_round_trips_within_one_step() {
        for duration_ms in 0..GAS_WAIT_MAX_MS {
            let code = gas_wait(duration_ms);
            let decoded = gas_wait_duration_ms(code);
            let step = 1u32 << (2 * (code >> 6) as u32);
            assert!(decoded <= duration_ms as u32, "{} decoded as {}", duration_ms, decoded);
            assert!(duration_ms as u32 - decoded < step, "{} decoded as {}", duration_ms, decoded);
        }
    }

    #[test]
    fn gas_wait_encoding_points() {
        assert_eq!(gas_wait(0), 0);
        assert_eq!(gas_wait(63), 63);
        assert_eq!(gas_wait(64), 0x50);
        assert_eq!(gas_wait(150), 0x65);
        assert_eq!(gas_wait(GAS_WAIT_MAX_MS), 0xff);
        assert_eq!(gas_wait(u16::MAX), 0xff);
    }

    #[test]
    fn altitude_at_sea_level_and_vacuum() {
        assert_eq!(calc_altitude(STANDARD_SEA_LEVEL_HPA, STANDARD_SEA_LEVEL_HPA), 0.0);
        let vacuum = calc_altitude(STANDARD_SEA_LEVEL_HPA, 0.0);
        assert!(vacuum.is_finite());
        assert!((vacuum - 44330.0).abs() < 1e-6);
        let km = calc_altitude(STANDARD_SEA_LEVEL_HPA, 898.75);
        assert!(km > 950.0 && km < 1050.0, "altitude {}", km);
    }
}
