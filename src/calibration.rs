//! Voltage to capacity and NTC voltage to temperature tables.

/// One open-interval capacity band.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CapacityBand {
    /// Capacity reported for voltages inside the band
    pub percent: u8,
    /// Lower bound in mV, exclusive
    pub vmin_mv: i32,
    /// Upper bound in mV, exclusive
    pub vmax_mv: i32,
    /// Reserved correction offset
    pub offset: i32,
    /// Reserved hysteresis in mV
    pub hysteresis: i32,
}

impl CapacityBand {
    const fn new(percent: u8, vmin_mv: i32, vmax_mv: i32) -> Self {
        CapacityBand {
            percent,
            vmin_mv,
            vmax_mv,
            offset: 0,
            hysteresis: 10,
        }
    }

    /// Does `mv` fall strictly inside the band?
    pub fn contains(&self, mv: i32) -> bool {
        self.vmin_mv < mv && mv < self.vmax_mv
    }
}

/// One row of an NTC thermistor table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct NtcPoint {
    /// Temperature in °C
    pub temperature: i32,
    /// Thermistor voltage in µV at that temperature
    pub voltage_uv: i32,
}

impl NtcPoint {
    const fn new(temperature: i32, voltage_uv: i32) -> Self {
        NtcPoint {
            temperature,
            voltage_uv,
        }
    }
}

/// Built-in single-cell Li-ion capacity table.
pub static CAPACITY_TABLE: [CapacityBand; 12] = [
    CapacityBand::new(0, 3100, 3597),
    CapacityBand::new(1, 3598, 3672),
    CapacityBand::new(10, 3673, 3735),
    CapacityBand::new(20, 3736, 3757),
    CapacityBand::new(30, 3758, 3788),
    CapacityBand::new(40, 3789, 3832),
    CapacityBand::new(50, 3833, 3909),
    CapacityBand::new(60, 3910, 3988),
    CapacityBand::new(70, 3989, 4072),
    CapacityBand::new(80, 4073, 4156),
    CapacityBand::new(90, 4157, 4200),
    CapacityBand::new(100, 4201, 4500),
];

/// Built-in NTC table, temperature ascending, voltage descending.
pub static NTC_TABLE: [NtcPoint; 35] = [
    NtcPoint::new(-45, 1_800_000),
    NtcPoint::new(-40, 1_693_138),
    NtcPoint::new(-35, 1_665_952),
    NtcPoint::new(-30, 1_633_668),
    NtcPoint::new(-25, 1_595_877),
    NtcPoint::new(-20, 1_551_873),
    NtcPoint::new(-15, 1_501_569),
    NtcPoint::new(-10, 1_444_173),
    NtcPoint::new(-5, 1_379_919),
    NtcPoint::new(0, 1_308_687),
    NtcPoint::new(5, 1_231_323),
    NtcPoint::new(10, 1_149_570),
    NtcPoint::new(15, 1_065_303),
    NtcPoint::new(20, 979_678),
    NtcPoint::new(25, 895_000),
    NtcPoint::new(30, 812_338),
    NtcPoint::new(35, 733_267),
    NtcPoint::new(40, 658_735),
    NtcPoint::new(45, 589_543),
    NtcPoint::new(50, 525_875),
    NtcPoint::new(55, 467_795),
    NtcPoint::new(60, 415_297),
    NtcPoint::new(65, 368_123),
    NtcPoint::new(70, 326_146),
    NtcPoint::new(75, 288_699),
    NtcPoint::new(80, 255_758),
    NtcPoint::new(85, 226_817),
    NtcPoint::new(90, 201_430),
    NtcPoint::new(95, 179_128),
    NtcPoint::new(100, 159_466),
    NtcPoint::new(105, 142_204),
    NtcPoint::new(110, 127_049),
    NtcPoint::new(115, 113_656),
    NtcPoint::new(120, 101_957),
    NtcPoint::new(125, 91_546),
];

/// Nominal ADC reference in µV.
pub const NOMINAL_REFERENCE_UV: i32 = 1_800_000;

/// Temperature reported when no NTC table is configured.
pub const DEFAULT_TEMPERATURE: i32 = 25;

/// Measured vs. nominal ADC reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ReferenceCalibration {
    /// Reference voltage as measured on this board, µV
    pub measured_uv: i32,
    /// Reference voltage the NTC table was built against, µV
    pub nominal_uv: i32,
}

impl Default for ReferenceCalibration {
    fn default() -> Self {
        ReferenceCalibration {
            measured_uv: NOMINAL_REFERENCE_UV,
            nominal_uv: NOMINAL_REFERENCE_UV,
        }
    }
}

impl ReferenceCalibration {
    /// Rescale a raw reading when the measured reference differs from nominal.
    pub fn rescale(&self, raw: i32) -> i32 {
        if self.measured_uv == self.nominal_uv || self.nominal_uv == 0 {
            return raw;
        }
        (raw as i64 * self.measured_uv as i64 / self.nominal_uv as i64) as i32
    }
}

/// Capacity of the first band containing `mv`, or `None` if `mv` sits on a boundary or
/// outside the table.
pub fn capacity_for(table: &[CapacityBand], mv: i32) -> Option<u8> {
    table.iter().find(|band| band.contains(mv)).map(|band| band.percent)
}

/// Temperature of the row whose band towards the next row strictly contains `uv`.
///
/// Bands are compared without assuming a direction, so the table may be stored with
/// voltages ascending or descending.
pub fn temperature_for(table: &[NtcPoint], uv: i32) -> Option<i32> {
    table.windows(2).find_map(|pair| {
        let (lo, hi) = if pair[0].voltage_uv < pair[1].voltage_uv {
            (pair[0].voltage_uv, pair[1].voltage_uv)
        } else {
            (pair[1].voltage_uv, pair[0].voltage_uv)
        };
        (lo < uv && uv < hi).then_some(pair[0].temperature)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_inside_band() {
        assert_eq!(capacity_for(&CAPACITY_TABLE, 4180), Some(90));
        assert_eq!(capacity_for(&CAPACITY_TABLE, 3700), Some(10));
        assert_eq!(capacity_for(&CAPACITY_TABLE, 4300), Some(100));
    }

    #[test]
    fn capacity_boundaries_match_no_band() {
        for band in CAPACITY_TABLE.iter() {
            assert_eq!(capacity_for(&CAPACITY_TABLE, band.vmin_mv), None);
            assert_eq!(capacity_for(&CAPACITY_TABLE, band.vmax_mv), None);
        }
    }

    #[test]
    fn capacity_outside_table() {
        assert_eq!(capacity_for(&CAPACITY_TABLE, 2900), None);
        assert_eq!(capacity_for(&CAPACITY_TABLE, 4600), None);
        assert_eq!(capacity_for(&[], 4000), None);
    }

    #[test]
    fn capacity_is_deterministic() {
        let first = capacity_for(&CAPACITY_TABLE, 3850);
        for _ in 0..10 {
            assert_eq!(capacity_for(&CAPACITY_TABLE, 3850), first);
        }
    }

    #[test]
    fn ntc_between_rows() {
        assert_eq!(temperature_for(&NTC_TABLE, 850_000), Some(25));
        assert_eq!(temperature_for(&NTC_TABLE, 1_400_000), Some(-10));
        assert_eq!(temperature_for(&NTC_TABLE, 100_000), Some(120));
    }

    #[test]
    fn ntc_on_row_or_outside() {
        assert_eq!(temperature_for(&NTC_TABLE, 895_000), None);
        assert_eq!(temperature_for(&NTC_TABLE, 1_900_000), None);
        assert_eq!(temperature_for(&NTC_TABLE, 50_000), None);
    }

    #[test]
    fn ntc_ascending_table() {
        let table = [NtcPoint::new(0, 100), NtcPoint::new(10, 200), NtcPoint::new(20, 300)];
        assert_eq!(temperature_for(&table, 250), Some(10));
    }

    #[test]
    fn rescale_only_when_references_differ() {
        let nominal = ReferenceCalibration::default();
        assert_eq!(nominal.rescale(850_000), 850_000);

        let low = ReferenceCalibration {
            measured_uv: 1_750_000,
            nominal_uv: NOMINAL_REFERENCE_UV,
        };
        assert_eq!(low.rescale(1_800_000), 1_750_000);
    }
}
