//! Simulated MRS metabolite model and E/I ratio generator.
//!
//! Concentrations start inside physiological ranges, then drift with a slow
//! sinusoid, a linear trend and gaussian noise, clamped back into range each
//! sample. The E/I ratio is (Glu + Gln) / GABA.

use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::prng::Prng;

pub const METABOLITES: [&str; 8] = [
    "glutamate",
    "glutamine",
    "gaba",
    "naa",
    "creatine",
    "choline",
    "myo_inositol",
    "lactate",
];

/// Physiological range (institutional units) per metabolite, in
/// [`METABOLITES`] order.
const RANGES: [(f64, f64); 8] = [
    (8.0, 12.0), // Glu
    (3.0, 6.0),  // Gln
    (1.5, 3.0),  // GABA
    (7.0, 10.0), // NAA
    (6.0, 9.0),  // Cr
    (1.0, 2.5),  // Cho
    (3.0, 6.0),  // mI
    (0.5, 2.0),  // Lac
];

const GLU: usize = 0;
const GLN: usize = 1;
const GABA: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaboliteConcentrations {
    pub values: [f64; 8],
}

impl MetaboliteConcentrations {
    pub fn glutamate(&self) -> f64 {
        self.values[GLU]
    }

    pub fn glutamine(&self) -> f64 {
        self.values[GLN]
    }

    pub fn gaba(&self) -> f64 {
        self.values[GABA]
    }

    pub fn total_excitatory(&self) -> f64 {
        self.glutamate() + self.glutamine()
    }

    pub fn total_inhibitory(&self) -> f64 {
        self.gaba()
    }

    /// Excitatory/inhibitory ratio, guarded against a degenerate GABA value.
    pub fn ei_ratio(&self) -> f64 {
        let inhibitory = self.total_inhibitory();
        if inhibitory > 0.0 {
            self.total_excitatory() / inhibitory
        } else {
            warn!("GABA concentration is zero or negative, using default E/I ratio");
            1.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drift {
    frequency: f64,
    amplitude: f64,
    phase: f64,
    trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intervention {
    Excitatory,
    Inhibitory,
}

#[derive(Debug)]
pub struct MetaboliteModel {
    baseline: MetaboliteConcentrations,
    drift: [Drift; 8],
    noise_level: f64,
    drift_enabled: bool,
    started_at: Instant,
    rng: Prng,
}

impl MetaboliteModel {
    pub fn new(config: &Config, seed: u64) -> Self {
        let mut rng = if seed == 0 {
            Prng::from_entropy()
        } else {
            Prng::new(seed)
        };

        let mut values = [0.0; 8];
        for (i, (min, max)) in RANGES.iter().enumerate() {
            // Bias toward the middle of the range; 99.7% of draws land inside.
            let mean = (min + max) / 2.0;
            let std = (max - min) / 6.0;
            values[i] = (mean + std * rng.next_gaussian()).clamp(*min, *max);
        }
        let baseline = MetaboliteConcentrations { values };

        let drift = std::array::from_fn(|_| Drift {
            frequency: rng.gen_range_f64(0.001, 0.01),
            amplitude: rng.gen_range_f64(0.02, 0.08),
            phase: rng.gen_range_f64(0.0, std::f64::consts::TAU),
            trend: rng.gen_range_f64(-0.001, 0.001),
        });

        let model = Self {
            baseline,
            drift,
            noise_level: config.get_f64("generator.noise_level", 0.05),
            drift_enabled: config.get_bool("generator.drift_enabled", true),
            started_at: Instant::now(),
            rng,
        };
        info!("Metabolite model ready, baseline E/I {:.3}", model.baseline.ei_ratio());
        model
    }

    /// Current concentrations: baseline plus temporal dynamics.
    pub fn sample(&mut self) -> MetaboliteConcentrations {
        if !self.drift_enabled {
            return self.baseline;
        }

        let t = self.started_at.elapsed().as_secs_f64();
        let mut values = [0.0; 8];
        for i in 0..8 {
            let base = self.baseline.values[i];
            let d = self.drift[i];
            let oscillation =
                d.amplitude * (std::f64::consts::TAU * d.frequency * t + d.phase).sin();
            let noise = self.rng.next_gaussian() * self.noise_level * base;
            let (min, max) = RANGES[i];
            values[i] = (base * (1.0 + oscillation + d.trend * t) + noise).clamp(min, max);
        }
        MetaboliteConcentrations { values }
    }

    /// The scalar neurofeedback signal.
    pub fn next_value(&mut self) -> f64 {
        self.sample().ei_ratio()
    }

    /// Shift the baseline to mimic a pharmacological/behavioral intervention.
    pub fn apply_intervention(&mut self, kind: Intervention, magnitude: f64) {
        let m = magnitude.clamp(0.0, 1.0);
        match kind {
            Intervention::Excitatory => {
                self.baseline.values[GLU] *= 1.0 + m;
                self.baseline.values[GLN] *= 1.0 + m * 0.5;
                self.baseline.values[GABA] *= 1.0 - m * 0.2;
            }
            Intervention::Inhibitory => {
                self.baseline.values[GABA] *= 1.0 + m;
                self.baseline.values[GLU] *= 1.0 - m * 0.3;
            }
        }
        for (i, (min, max)) in RANGES.iter().enumerate() {
            self.baseline.values[i] = self.baseline.values[i].clamp(*min, *max);
        }
        info!(
            "Applied {:?} intervention ({:.2}); baseline E/I now {:.3}",
            kind,
            m,
            self.baseline.ei_ratio()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MetaboliteModel {
        MetaboliteModel::new(&Config::default(), 42)
    }

    #[test]
    fn samples_stay_in_physiological_range() {
        let mut m = model();
        for _ in 0..200 {
            let c = m.sample();
            for (i, (min, max)) in RANGES.iter().enumerate() {
                assert!(
                    (*min..=*max).contains(&c.values[i]),
                    "{} out of range: {}",
                    METABOLITES[i],
                    c.values[i]
                );
            }
        }
    }

    #[test]
    fn ei_ratio_guards_degenerate_gaba() {
        let c = MetaboliteConcentrations {
            values: [10.0, 4.0, 0.0, 8.0, 7.0, 1.5, 4.0, 1.0],
        };
        assert_eq!(c.ei_ratio(), 1.0);
    }

    #[test]
    fn ei_ratio_is_excitatory_over_inhibitory() {
        let c = MetaboliteConcentrations {
            values: [10.0, 4.0, 2.0, 8.0, 7.0, 1.5, 4.0, 1.0],
        };
        assert!((c.ei_ratio() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn excitatory_intervention_raises_ratio() {
        let mut m = model();
        m.drift_enabled = false;
        let before = m.baseline.ei_ratio();
        m.apply_intervention(Intervention::Excitatory, 0.3);
        // Clamping can cap individual metabolites, but the ratio never drops.
        assert!(m.baseline.ei_ratio() >= before);
    }

    #[test]
    fn inhibitory_intervention_lowers_ratio() {
        let mut m = model();
        m.drift_enabled = false;
        let before = m.baseline.ei_ratio();
        m.apply_intervention(Intervention::Inhibitory, 0.3);
        assert!(m.baseline.ei_ratio() <= before);
    }
}
