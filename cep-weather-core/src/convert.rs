//! Temperature scale conversions from Celsius.

pub fn to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

pub fn to_kelvin(celsius: f64) -> f64 {
    celsius + 273.15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_points() {
        assert_eq!(to_fahrenheit(0.0), 32.0);
        assert_eq!(to_fahrenheit(100.0), 212.0);
        assert_eq!(to_fahrenheit(-40.0), -40.0);
        assert_eq!(to_kelvin(0.0), 273.15);
    }

    #[test]
    fn repeated_calls_do_not_drift() {
        for c in [-273.15, -12.3, 0.1, 21.7, 36.6, 1e6] {
            let f = to_fahrenheit(c);
            let k = to_kelvin(c);
            for _ in 0..100 {
                assert_eq!(to_fahrenheit(c), f);
                assert_eq!(to_kelvin(c), k);
            }
            assert_eq!(f, c * 1.8 + 32.0);
            assert_eq!(k, c + 273.15);
        }
    }
}
