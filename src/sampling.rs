//! Raw battery measurements and their averaging.

use embedded_hal_async::delay::DelayNs;

use crate::Error;

/// Samples taken per averaged reading.
pub const SAMPLES_PER_READING: usize = 8;

/// Delay between two samples of one reading, in µs.
pub const SAMPLE_INTERVAL_US: u32 = 1000;

/// A source of raw battery voltage and NTC readings.
#[allow(async_fn_in_trait)]
pub trait SamplingSource {
    /// Is a battery voltage channel wired up?
    fn has_voltage(&self) -> bool {
        true
    }

    /// Is a battery thermistor channel wired up?
    fn has_temperature(&self) -> bool {
        true
    }

    /// Battery voltage in µV.
    async fn read_voltage(&mut self) -> Result<i32, Error>;

    /// Thermistor voltage in µV.
    async fn read_temperature(&mut self) -> Result<i32, Error>;
}

/// An ADC with numbered input channels.
#[allow(async_fn_in_trait)]
pub trait Adc {
    /// Read one channel, returning µV.
    async fn read_channel(&mut self, channel: u8) -> Result<i32, Error>;
}

/// A [`SamplingSource`] reading battery voltage and thermistor from two ADC channels.
///
/// A channel left as `None` is reported as missing.
pub struct AdcChannels<A> {
    adc: A,
    vbat: Option<u8>,
    tbat: Option<u8>,
}

impl<A: Adc> AdcChannels<A> {
    /// Create a new `AdcChannels`
    pub fn new(adc: A, vbat: Option<u8>, tbat: Option<u8>) -> Self {
        AdcChannels { adc, vbat, tbat }
    }
}

impl<A: Adc> SamplingSource for AdcChannels<A> {
    fn has_voltage(&self) -> bool {
        self.vbat.is_some()
    }

    fn has_temperature(&self) -> bool {
        self.tbat.is_some()
    }

    async fn read_voltage(&mut self) -> Result<i32, Error> {
        let channel = self.vbat.ok_or(Error::NotImplemented)?;
        self.adc.read_channel(channel).await
    }

    async fn read_temperature(&mut self) -> Result<i32, Error> {
        let channel = self.tbat.ok_or(Error::NotImplemented)?;
        self.adc.read_channel(channel).await
    }
}

/// Which measurement to average.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Channel {
    /// Battery voltage
    Voltage,
    /// Battery thermistor
    Temperature,
}

/// Mean of the samples after dropping one highest and one lowest value.
pub fn trimmed_mean(samples: &[i32; SAMPLES_PER_READING]) -> i32 {
    let mut sum = 0i64;
    let mut max = samples[0];
    let mut min = samples[0];
    for &s in samples {
        sum += s as i64;
        max = max.max(s);
        min = min.min(s);
    }
    ((sum - max as i64 - min as i64) / (SAMPLES_PER_READING as i64 - 2)) as i32
}

/// Take [`SAMPLES_PER_READING`] samples of `channel` and return their trimmed mean.
///
/// The first failing sample aborts the reading.
pub async fn read_averaged<S, D>(source: &mut S, delay: &mut D, channel: Channel) -> Result<i32, Error>
where
    S: SamplingSource,
    D: DelayNs,
{
    let mut samples = [0i32; SAMPLES_PER_READING];
    for sample in samples.iter_mut() {
        *sample = match channel {
            Channel::Voltage => source.read_voltage().await?,
            Channel::Temperature => source.read_temperature().await?,
        };
        delay.delay_us(SAMPLE_INTERVAL_US).await;
    }
    Ok(trimmed_mean(&samples))
}
