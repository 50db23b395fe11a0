/// Linear warmup from 0 to `base_lr`, then linear decay to 0 at `total_steps`.
///
/// `lr_at(step)` is the rate used for the optimizer update that
/// happens at `step` (0-based), so the very first update uses 0.
#[derive(Debug, Clone, Copy)]
pub struct LinearWarmupDecay {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
}

impl LinearWarmupDecay {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        Self { base_lr, warmup_steps, total_steps }
    }

    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps.max(1) as f64;
        }
        let decay_span = self.total_steps.saturating_sub(self.warmup_steps).max(1);
        let remaining  = self.total_steps.saturating_sub(step);
        self.base_lr * (remaining as f64 / decay_span as f64).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_then_decay() {
        let s = LinearWarmupDecay::new(1.0, 10, 110);
        assert_eq!(s.lr_at(0),   0.0);
        assert_eq!(s.lr_at(5),   0.5);
        assert_eq!(s.lr_at(10),  1.0);
        assert_eq!(s.lr_at(60),  0.5);
        assert_eq!(s.lr_at(110), 0.0);
        assert_eq!(s.lr_at(500), 0.0);
    }

    #[test]
    fn test_no_warmup_starts_at_base() {
        let s = LinearWarmupDecay::new(2e-6, 0, 100);
        assert_eq!(s.lr_at(0), 2e-6);
    }

    #[test]
    fn test_warmup_longer_than_run() {
        // Total steps inside the warmup: rate only ever ramps up
        let s = LinearWarmupDecay::new(1.0, 50, 20);
        assert!(s.lr_at(19) < 1.0);
        assert!(s.lr_at(19) > s.lr_at(1));
    }
}
