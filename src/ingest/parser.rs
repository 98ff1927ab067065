use serde::Deserialize;

use crate::error::ParseError;
use crate::model::Reading;

// Only the two fields we need; everything else in the payload is ignored.
#[derive(Deserialize)]
struct WeatherPayload {
    name: String,
    main: MainSection,
}

#[derive(Deserialize)]
struct MainSection {
    temp: f64,
}

/// Decodes `{"name": <location>, "main": {"temp": <number>}}`.
///
/// The payload carries no usable time, so the caller supplies `timestamp`.
pub fn parse(raw: &str, timestamp: i64) -> Result<Reading, ParseError> {
    let payload: WeatherPayload = serde_json::from_str(raw)?;
    if payload.name.trim().is_empty() {
        return Err(ParseError::EmptyLocation);
    }
    Ok(Reading {
        location: payload.name,
        temperature: payload.main.temp,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openweather_shape() {
        let raw = r#"{"coord":{"lon":2.35},"name":"Paris","main":{"temp":22.5,"humidity":40},"cod":200}"#;
        let reading = parse(raw, 7).unwrap();
        assert_eq!(reading, Reading { location: "Paris".into(), temperature: 22.5, timestamp: 7 });
    }

    #[test]
    fn integer_temperature_is_numeric() {
        let reading = parse(r#"{"name":"Oslo","main":{"temp":-3}}"#, 0).unwrap();
        assert_eq!(reading.temperature, -3.0);
    }

    #[test]
    fn rejects_missing_or_non_numeric_fields() {
        for raw in [
            r#"{"main":{"temp":1.0}}"#,
            r#"{"name":"Paris"}"#,
            r#"{"name":"Paris","main":{}}"#,
            r#"{"name":"Paris","main":{"temp":"hot"}}"#,
            r#"{"name":42,"main":{"temp":1.0}}"#,
            "not json",
            "",
        ] {
            assert!(matches!(parse(raw, 0), Err(ParseError::Json(_))), "accepted {raw:?}");
        }
    }

    #[test]
    fn rejects_blank_location() {
        assert!(matches!(
            parse(r#"{"name":"  ","main":{"temp":1.0}}"#, 0),
            Err(ParseError::EmptyLocation)
        ));
    }
}
