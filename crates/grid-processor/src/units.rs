//! Unit conversion from provider labels to canonical catalog units.

/// Linear conversion `canonical = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub scale: f64,
    pub offset: f64,
}

impl UnitConversion {
    pub const IDENTITY: UnitConversion = UnitConversion {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Key of the provider `units` block that describes a variable.
///
/// The provider reports one unit per physical quantity rather than per
/// variable, e.g. `temperature` covers felt temperature too.
pub fn unit_group(code: &str) -> &str {
    match code {
        "temperature" | "felttemperature" | "dewpoint" => "temperature",
        "windspeed" | "wind_u" | "wind_v" => "windspeed",
        "precipitation" | "convective_precipitation" => "precipitation",
        "sealevelpressure" => "pressure",
        other => other,
    }
}

/// Map a unit label to its canonical spelling.
fn canonical_label(label: &str) -> Option<&'static str> {
    let cleaned: String = label
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '°')
        .collect::<String>()
        .to_lowercase();

    let canonical = match cleaned.as_str() {
        "c" | "degc" | "celsius" => "degC",
        "f" | "degf" | "fahrenheit" => "degF",
        "k" | "kelvin" => "K",
        "ms-1" | "m/s" | "mps" => "m/s",
        "kmh" | "km/h" | "kph" => "km/h",
        "mph" => "mph",
        "kn" | "kt" | "knots" => "kn",
        "mm" => "mm",
        "inch" | "in" => "inch",
        "hpa" | "mbar" | "mb" => "hPa",
        "pa" => "Pa",
        "inhg" => "inHg",
        "percent" | "percentage" | "%" => "percent",
        "degree" | "degrees" | "deg" => "degree",
        "fraction" => "fraction",
        "code" => "code",
        "flag" => "flag",
        "index" => "index",
        _ => return None,
    };
    Some(canonical)
}

/// Conversion from a provider label into a canonical unit.
///
/// Returns `None` when the label is unknown or no conversion exists; the
/// caller keeps raw values in that case.
pub fn conversion_to(raw_label: &str, canonical: &str) -> Option<UnitConversion> {
    let from = canonical_label(raw_label)?;
    if from == canonical {
        return Some(UnitConversion::IDENTITY);
    }

    let (scale, offset) = match (from, canonical) {
        ("degF", "degC") => (5.0 / 9.0, -32.0 * 5.0 / 9.0),
        ("K", "degC") => (1.0, -273.15),
        ("km/h", "m/s") => (1.0 / 3.6, 0.0),
        ("mph", "m/s") => (0.44704, 0.0),
        ("kn", "m/s") => (1852.0 / 3600.0, 0.0),
        ("inch", "mm") => (25.4, 0.0),
        ("inHg", "hPa") => (33.863_886, 0.0),
        ("Pa", "hPa") => (0.01, 0.0),
        _ => return None,
    };
    Some(UnitConversion { scale, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_for_canonical_labels() {
        assert!(conversion_to("mm", "mm").unwrap().is_identity());
        assert!(conversion_to("C", "degC").unwrap().is_identity());
        assert!(conversion_to("ms-1", "m/s").unwrap().is_identity());
        assert!(conversion_to("percent", "percent").unwrap().is_identity());
    }

    #[test]
    fn test_temperature_conversion() {
        let conv = conversion_to("°F", "degC").unwrap();
        assert!((conv.apply(212.0) - 100.0).abs() < 1e-9);
        assert!((conv.apply(32.0)).abs() < 1e-9);
    }

    #[test]
    fn test_speed_and_length_conversion() {
        assert!((conversion_to("kmh", "m/s").unwrap().apply(36.0) - 10.0).abs() < 1e-9);
        assert!((conversion_to("kn", "m/s").unwrap().apply(1.0) - 0.514444).abs() < 1e-5);
        assert!((conversion_to("inch", "mm").unwrap().apply(2.0) - 50.8).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_or_incompatible() {
        assert!(conversion_to("furlongs", "mm").is_none());
        assert!(conversion_to("mm", "degC").is_none());
    }

    #[test]
    fn test_unit_group() {
        assert_eq!(unit_group("felttemperature"), "temperature");
        assert_eq!(unit_group("convective_precipitation"), "precipitation");
        assert_eq!(unit_group("relativehumidity"), "relativehumidity");
    }
}
