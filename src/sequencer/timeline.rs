// Timeline - Beat grid helpers and time signature values
// Every position in the project model is a beat offset (f32) on this grid

use std::fmt;

/// Number of beats in one 4/4 bar, the unit the whole grid is expressed in
pub const BEATS_PER_BAR: f32 = 4.0;

/// Finest subdivision a stored beat is snapped to (1/16 of a beat)
pub const BEAT_RESOLUTION: f32 = 16.0;

/// Default project length used when the tracks hold nothing yet
pub const DEFAULT_NUM_BARS: u32 = 8;

/// Snap a beat offset to the grid resolution
pub fn round_beat(beat: f32) -> f32 {
    (beat * BEAT_RESOLUTION).round() / BEAT_RESOLUTION
}

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar (2..=64)
    pub denominator: u8, // Note value, power of two (2..=32)
}

impl TimeSignature {
    pub const MIN_NUMERATOR: u8 = 2;
    pub const MAX_NUMERATOR: u8 = 64;
    pub const MIN_DENOMINATOR: u8 = 2;
    pub const MAX_DENOMINATOR: u8 = 32;

    /// Creates a new time signature
    ///
    /// Out-of-range values are constrained rather than rejected: the numerator
    /// is limited to 2..=64 and the denominator is rounded up to a power of two
    /// within 2..=32.
    pub fn new(numerator: u8, denominator: u8) -> Self {
        let denominator = denominator
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or(Self::MAX_DENOMINATOR)
            .clamp(Self::MIN_DENOMINATOR, Self::MAX_DENOMINATOR);

        Self {
            numerator: numerator.clamp(Self::MIN_NUMERATOR, Self::MAX_NUMERATOR),
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    /// Parse strings like "7/8", "3|4" or "5-4"
    ///
    /// Anything that doesn't split into exactly two numbers falls back to 4/4.
    pub fn parse(text: &str) -> Self {
        let parts: Vec<&str> = text
            .split(['/', '\\', '|', '-'])
            .map(|part| part.trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace()))
            .filter(|part| !part.is_empty())
            .collect();

        if let [numerator, denominator] = parts.as_slice() {
            if let (Ok(n), Ok(d)) = (numerator.parse::<u32>(), denominator.parse::<u32>()) {
                let n = n.min(u8::MAX as u32) as u8;
                let d = d.min(u8::MAX as u32) as u8;
                return Self::new(n, d);
            }
        }

        Self::default()
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> f32 {
        self.numerator as f32
    }

    /// Length of one bar measured on the quarter-note beat grid
    /// Example: 4/4 = 4.0, 6/8 = 3.0, 7/16 = 1.75
    pub fn bar_length_in_beats(&self) -> f32 {
        self.numerator as f32 * BEATS_PER_BAR / self.denominator as f32
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature() {
        let ts = TimeSignature::four_four();
        assert_eq!(ts.numerator, 4);
        assert_eq!(ts.denominator, 4);
        assert_eq!(ts.beats_per_bar(), 4.0);
        assert_eq!(ts.to_string(), "4/4");
    }

    #[test]
    fn test_bar_length_in_beats() {
        assert_eq!(TimeSignature::four_four().bar_length_in_beats(), 4.0);
        assert_eq!(TimeSignature::three_four().bar_length_in_beats(), 3.0);
        assert_eq!(TimeSignature::six_eight().bar_length_in_beats(), 3.0);
        assert_eq!(TimeSignature::new(7, 16).bar_length_in_beats(), 1.75);
    }

    #[test]
    fn test_constraints() {
        // Denominator gets rounded up to the next power of two
        assert_eq!(TimeSignature::new(4, 5).denominator, 8);
        assert_eq!(TimeSignature::new(4, 100).denominator, 32);
        assert_eq!(TimeSignature::new(1, 4).numerator, 2);
        assert_eq!(TimeSignature::new(99, 4).numerator, 64);
    }

    #[test]
    fn test_parse() {
        assert_eq!(TimeSignature::parse("7/8"), TimeSignature::new(7, 8));
        assert_eq!(TimeSignature::parse(" 3 | 4 "), TimeSignature::three_four());
        assert_eq!(TimeSignature::parse("5-4"), TimeSignature::new(5, 4));
        assert_eq!(TimeSignature::parse("garbage"), TimeSignature::four_four());
        assert_eq!(TimeSignature::parse("1/2/3"), TimeSignature::four_four());
    }

    #[test]
    fn test_round_beat() {
        assert_eq!(round_beat(1.0), 1.0);
        assert_eq!(round_beat(1.03), 1.0);
        assert_eq!(round_beat(1.04), 1.0625);
        assert_eq!(round_beat(-0.5), -0.5);
    }
}
