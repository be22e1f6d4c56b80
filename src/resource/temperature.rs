use super::{HandlerError, ResourceHandler, ResourceValue};
use crate::message::Request;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default Linux thermal zone exposed by most boards and laptops.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// A data source that currently has no reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no sensor reading available: {reason}")]
pub struct SensorUnavailable {
    /// Why the reading could not be produced
    pub reason: String,
}

impl SensorUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// External source of a numeric reading.
pub trait SensorSource: Send + Sync + 'static {
    fn current_reading(&self) -> Result<f64, SensorUnavailable>;
}

impl<F> SensorSource for F
where
    F: Fn() -> Result<f64, SensorUnavailable> + Send + Sync + 'static,
{
    fn current_reading(&self) -> Result<f64, SensorUnavailable> {
        self()
    }
}

/// Always returns the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedReading(pub f64);

impl SensorSource for FixedReading {
    fn current_reading(&self) -> Result<f64, SensorUnavailable> {
        Ok(self.0)
    }
}

/// Reads a sysfs thermal zone file holding millidegrees Celsius.
#[derive(Debug, Clone)]
pub struct ThermalZoneSource {
    path: PathBuf,
}

impl ThermalZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ThermalZoneSource {
    fn default() -> Self {
        Self::new(DEFAULT_THERMAL_ZONE)
    }
}

impl SensorSource for ThermalZoneSource {
    fn current_reading(&self) -> Result<f64, SensorUnavailable> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            SensorUnavailable::new(format!("{}: {e}", self.path.display()))
        })?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SensorUnavailable::new(format!(
                "{}: empty reading",
                self.path.display()
            )));
        }
        let millidegrees: i64 = raw.parse().map_err(|_| {
            SensorUnavailable::new(format!("{}: unparsable reading {raw:?}", self.path.display()))
        })?;
        Ok(millidegrees as f64 / 1000.0)
    }
}

/// GET-only resource returning the current temperature as decimal text.
pub struct TemperatureResource<S> {
    source: S,
}

impl<S: SensorSource> TemperatureResource<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: SensorSource> ResourceHandler for TemperatureResource<S> {
    fn handle(&self, request: &Request) -> Result<ResourceValue, HandlerError> {
        info!(request_id = %request.request_id, path = %request.path, "Temperature requested");
        let reading = self.source.current_reading().inspect_err(|e| {
            debug!(request_id = %request.request_id, reason = %e.reason, "Sensor has no reading");
        })?;
        Ok(ResourceValue::Number(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Method;
    use std::io::Write;

    #[test]
    fn test_thermal_zone_parses_millidegrees() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "42500").unwrap();
        let source = ThermalZoneSource::new(file.path());
        assert_eq!(source.current_reading().unwrap(), 42.5);
    }

    #[test]
    fn test_thermal_zone_missing_or_empty() {
        let missing = ThermalZoneSource::new("/nonexistent/thermal_zone/temp");
        assert!(missing.current_reading().is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        let empty = ThermalZoneSource::new(file.path());
        let err = empty.current_reading().unwrap_err();
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn test_unavailable_maps_to_handler_unavailable() {
        let resource = TemperatureResource::new(|| -> Result<f64, SensorUnavailable> {
            Err(SensorUnavailable::new("no gpu"))
        });
        let err = resource
            .handle(&Request::new(Method::Get, "/temp"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Unavailable(_)));
    }
}
