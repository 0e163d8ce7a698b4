pub const DEFAULT_THRESHOLD_C: f64 = 35.0;
pub const DEFAULT_TEMPLATE: &str =
    "Achtung! Grenzwert von {threshold} °C überschritten. Temperatur erreicht: {value}°C";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Inactive -> Active. The only transition that notifies.
    Triggered,
    /// Active -> Active.
    Suppressed,
    /// Active -> Inactive.
    Reset,
    /// Inactive -> Inactive.
    Idle,
}

impl Transition {
    pub fn notifies(self) -> bool {
        matches!(self, Transition::Triggered)
    }
}

/// Edge-triggered latch over a single threshold.
///
/// Strictly above the threshold arms it; at or below resets it. The gate
/// does not deliver anything itself, callers act on [`Transition::Triggered`].
#[derive(Debug, Clone)]
pub struct AlertGate {
    threshold: f64,
    template: String,
    state: AlertState,
}

impl AlertGate {
    pub fn new(threshold: f64) -> Self {
        Self::with_template(threshold, DEFAULT_TEMPLATE)
    }

    pub fn with_template(threshold: f64, template: impl Into<String>) -> Self {
        Self {
            threshold,
            template: template.into(),
            state: AlertState::Inactive,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn evaluate(&mut self, value: f64) -> Transition {
        let above = value > self.threshold;
        let transition = match (self.state, above) {
            (AlertState::Inactive, true) => Transition::Triggered,
            (AlertState::Active, true) => Transition::Suppressed,
            (AlertState::Active, false) => Transition::Reset,
            (AlertState::Inactive, false) => Transition::Idle,
        };
        self.state = if above {
            AlertState::Active
        } else {
            AlertState::Inactive
        };
        transition
    }

    pub fn message(&self, value: f64) -> String {
        self.template
            .replace("{threshold}", &format_threshold(self.threshold))
            .replace("{value}", &format!("{value:.2}"))
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_C)
    }
}

/// Whole numbers keep one decimal ("35.0"), anything else prints as-is.
fn format_threshold(threshold: f64) -> String {
    if threshold.fract() == 0.0 {
        format!("{threshold:.1}")
    } else {
        threshold.to_string()
    }
}
