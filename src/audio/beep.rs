use rodio::Source;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const FREQUENCY_HZ: f32 = 800.0;
const PEAK_GAIN: f32 = 0.3;
const TAIL_GAIN: f32 = 0.01;
const ATTACK_SECS: f32 = 0.01;
const LENGTH_SECS: f32 = 0.5;

/// Short alert tone: an 800 Hz sine with a 10 ms linear attack up to 0.3,
/// then an exponential decay down to 0.01 at the half-second mark.
pub struct Beep {
    sample_rate: u32,
    index: u32,
    total_samples: u32,
}

impl Beep {
    pub fn new() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            index: 0,
            total_samples: (SAMPLE_RATE as f32 * LENGTH_SECS) as u32,
        }
    }

    fn gain_at(t: f32) -> f32 {
        if t < ATTACK_SECS {
            PEAK_GAIN * (t / ATTACK_SECS)
        } else {
            let progress = ((t - ATTACK_SECS) / (LENGTH_SECS - ATTACK_SECS)).min(1.0);
            PEAK_GAIN * (TAIL_GAIN / PEAK_GAIN).powf(progress)
        }
    }
}

impl Default for Beep {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Beep {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total_samples {
            return None;
        }

        let t = self.index as f32 / self.sample_rate as f32;
        self.index += 1;

        let wave = (2.0 * std::f32::consts::PI * FREQUENCY_HZ * t).sin();
        Some(wave * Self::gain_at(t))
    }
}

impl Source for Beep {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.total_samples - self.index) as usize)
    }

    fn channels(&self) -> u16 {
        1 // Mono
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(LENGTH_SECS))
    }
}
