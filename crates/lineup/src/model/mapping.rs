//! Mapping functions normalizing raw numbers into a render range.
//!
//! A [`MappingFunction`] is either a monotone scale ([`ScaleMapping`]) or a
//! user script ([`ScriptMapping`]) evaluated by the sandboxed
//! [`lineup_core::script`] interpreter. Both round-trip through [`MappingDump`].

use std::fmt;

use lineup_core::logging::targets;
use lineup_core::script::{self, Program, Scope};
use serde::{Deserialize, Serialize};

/// Default body of a script mapping: linear interpolation over the domain.
pub const DEFAULT_MAPPING_SCRIPT: &str = "return this.linear(value,this.value_min,this.value_max);";

/// Lower domain bound substituted for `0` in log scales.
const LOG_DOMAIN_FLOOR: f64 = 0.000_000_1;

/// Transform applied before interpolating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleType {
    #[default]
    Linear,
    Log,
    Sqrt,
    Pow1_1,
    Pow2,
    Pow3,
}

impl ScaleType {
    /// Parse a scale name; unknown names fall back to linear.
    pub fn parse(name: &str) -> Self {
        match name {
            "log" => ScaleType::Log,
            "sqrt" => ScaleType::Sqrt,
            "pow1.1" => ScaleType::Pow1_1,
            "pow2" => ScaleType::Pow2,
            "pow3" => ScaleType::Pow3,
            _ => ScaleType::Linear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleType::Linear => "linear",
            ScaleType::Log => "log",
            ScaleType::Sqrt => "sqrt",
            ScaleType::Pow1_1 => "pow1.1",
            ScaleType::Pow2 => "pow2",
            ScaleType::Pow3 => "pow3",
        }
    }

    fn transform(&self, v: f64) -> f64 {
        let pow = |k: f64| v.signum() * v.abs().powf(k);
        match self {
            ScaleType::Linear => v,
            ScaleType::Log => v.ln(),
            ScaleType::Sqrt => pow(0.5),
            ScaleType::Pow1_1 => pow(1.1),
            ScaleType::Pow2 => pow(2.0),
            ScaleType::Pow3 => pow(3.0),
        }
    }
}

impl fmt::Display for ScaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable form of a mapping function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDump {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A clamped monotone scale from `domain` to `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleMapping {
    scale: ScaleType,
    domain: [f64; 2],
    range: [f64; 2],
}

impl Default for ScaleMapping {
    fn default() -> Self {
        Self::new([0.0, 1.0], ScaleType::Linear, [0.0, 1.0])
    }
}

impl ScaleMapping {
    pub fn new(domain: [f64; 2], scale: ScaleType, range: [f64; 2]) -> Self {
        Self {
            scale,
            domain: fix_domain(domain, scale),
            range,
        }
    }

    /// A linear scale onto `[0, 1]`.
    pub fn linear(domain: [f64; 2]) -> Self {
        Self::new(domain, ScaleType::Linear, [0.0, 1.0])
    }

    pub fn scale_type(&self) -> ScaleType {
        self.scale
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn set_domain(&mut self, domain: [f64; 2]) {
        self.domain = fix_domain(domain, self.scale);
    }

    pub fn range(&self) -> [f64; 2] {
        self.range
    }

    pub fn set_range(&mut self, range: [f64; 2]) {
        self.range = range;
    }

    /// Map `v`; the position within the domain is clamped to `[0, 1]`.
    pub fn apply(&self, v: f64) -> f64 {
        let lo = self.scale.transform(self.domain[0]);
        let hi = self.scale.transform(self.domain[1]);
        let span = hi - lo;
        let t = if span == 0.0 || !span.is_finite() {
            0.0
        } else {
            ((self.scale.transform(v) - lo) / span).clamp(0.0, 1.0)
        };
        self.range[0] + t * (self.range[1] - self.range[0])
    }
}

fn fix_domain(mut domain: [f64; 2], scale: ScaleType) -> [f64; 2] {
    if scale == ScaleType::Log && domain[0] == 0.0 {
        domain[0] = LOG_DOMAIN_FLOOR;
    }
    domain
}

/// A user script mapping `value` given the domain.
///
/// The script sees `value`, `value_min`, `value_max`, `value_range` and
/// `value_domain`. Its result is clamped to `[0, 1]`.
#[derive(Clone)]
pub struct ScriptMapping {
    domain: [f64; 2],
    code: String,
    program: Option<Program>,
}

impl fmt::Debug for ScriptMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptMapping")
            .field("domain", &self.domain)
            .field("code", &self.code)
            .field("compiled", &self.program.is_some())
            .finish()
    }
}

impl PartialEq for ScriptMapping {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Default for ScriptMapping {
    fn default() -> Self {
        Self::new([0.0, 1.0], DEFAULT_MAPPING_SCRIPT)
    }
}

impl ScriptMapping {
    pub fn new(domain: [f64; 2], code: impl Into<String>) -> Self {
        let code = code.into();
        let program = script::compile_logged(&code).ok();
        Self {
            domain,
            code,
            program,
        }
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn set_domain(&mut self, domain: [f64; 2]) {
        self.domain = domain;
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replace the script, recompiling only when it changed.
    pub fn set_code(&mut self, code: impl Into<String>) {
        let code = code.into();
        if code == self.code {
            return;
        }
        self.program = script::compile_logged(&code).ok();
        self.code = code;
    }

    pub fn apply(&self, v: f64) -> f64 {
        let Some(program) = &self.program else {
            return f64::NAN;
        };
        let [min, max] = self.domain;
        let scope = Scope::new()
            .with("value", v)
            .with("value_min", min)
            .with("value_max", max)
            .with("value_range", max - min)
            .with("value_domain", vec![min, max]);
        let r = program.evaluate_number(&scope);
        if r.is_nan() {
            tracing::trace!(target: targets::MAPPING, code = %self.code, value = v, "script mapping produced NaN");
            return r;
        }
        r.clamp(0.0, 1.0)
    }
}

/// Normalizes raw numbers of a number column.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingFunction {
    Scale(ScaleMapping),
    Script(ScriptMapping),
}

impl Default for MappingFunction {
    fn default() -> Self {
        MappingFunction::Scale(ScaleMapping::default())
    }
}

impl MappingFunction {
    pub fn apply(&self, v: f64) -> f64 {
        match self {
            MappingFunction::Scale(s) => s.apply(v),
            MappingFunction::Script(s) => s.apply(v),
        }
    }

    pub fn domain(&self) -> [f64; 2] {
        match self {
            MappingFunction::Scale(s) => s.domain(),
            MappingFunction::Script(s) => s.domain(),
        }
    }

    pub fn set_domain(&mut self, domain: [f64; 2]) {
        match self {
            MappingFunction::Scale(s) => s.set_domain(domain),
            MappingFunction::Script(s) => s.set_domain(domain),
        }
    }

    pub fn dump(&self) -> MappingDump {
        match self {
            MappingFunction::Scale(s) => MappingDump {
                type_name: s.scale.as_str().to_string(),
                domain: Some(s.domain),
                range: Some(s.range),
                code: None,
            },
            MappingFunction::Script(s) => MappingDump {
                type_name: "script".to_string(),
                domain: Some(s.domain),
                range: None,
                code: Some(s.code.clone()),
            },
        }
    }

    /// Rebuild a mapping from its dump. Missing fields take the defaults.
    pub fn restore(dump: &MappingDump) -> Self {
        let domain = dump.domain.unwrap_or([0.0, 1.0]);
        if dump.type_name == "script" {
            let code = dump.code.as_deref().unwrap_or(DEFAULT_MAPPING_SCRIPT);
            return MappingFunction::Script(ScriptMapping::new(domain, code));
        }
        MappingFunction::Scale(ScaleMapping::new(
            domain,
            ScaleType::parse(&dump.type_name),
            dump.range.unwrap_or([0.0, 1.0]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_scale_clamps() {
        let m = ScaleMapping::linear([0.0, 10.0]);
        assert!(approx(m.apply(5.0), 0.5));
        assert!(approx(m.apply(-3.0), 0.0));
        assert!(approx(m.apply(42.0), 1.0));
        assert!(m.apply(f64::NAN).is_nan());
    }

    #[test]
    fn test_custom_range_and_degenerate_domain() {
        let m = ScaleMapping::new([0.0, 10.0], ScaleType::Linear, [1.0, 0.0]);
        assert!(approx(m.apply(2.5), 0.75));

        let flat = ScaleMapping::new([3.0, 3.0], ScaleType::Linear, [0.2, 0.8]);
        assert!(approx(flat.apply(3.0), 0.2));
    }

    #[test]
    fn test_log_domain_fix() {
        let mut m = ScaleMapping::new([0.0, 100.0], ScaleType::Log, [0.0, 1.0]);
        assert_eq!(m.domain()[0], LOG_DOMAIN_FLOOR);
        assert!(approx(m.apply(100.0), 1.0));
        assert!(approx(m.apply(0.0), 0.0));

        m.set_domain([0.0, 10.0]);
        assert_eq!(m.domain()[0], LOG_DOMAIN_FLOOR);
    }

    #[test]
    fn test_sqrt_and_pow() {
        let sqrt = ScaleMapping::new([0.0, 100.0], ScaleType::Sqrt, [0.0, 1.0]);
        assert!(approx(sqrt.apply(25.0), 0.5));
        let pow = ScaleMapping::new([0.0, 2.0], ScaleType::Pow2, [0.0, 1.0]);
        assert!(approx(pow.apply(1.0), 0.25));
    }

    #[test]
    fn test_script_mapping() {
        let m = ScriptMapping::new([0.0, 20.0], DEFAULT_MAPPING_SCRIPT);
        assert!(approx(m.apply(5.0), 0.25));
        assert!(approx(m.apply(40.0), 1.0));

        let halves = ScriptMapping::new([0.0, 1.0], "return value / this.value_range / 2");
        assert!(approx(halves.apply(1.0), 0.5));
    }

    #[test]
    fn test_broken_script_yields_nan() {
        let m = ScriptMapping::new([0.0, 1.0], "return (value");
        assert!(m.apply(0.5).is_nan());

        let unknown = ScriptMapping::new([0.0, 1.0], "return window.alert(value)");
        assert!(unknown.apply(0.5).is_nan());
    }

    #[test]
    fn test_equality_ignores_compiled_state() {
        let a = MappingFunction::Scale(ScaleMapping::linear([0.0, 1.0]));
        let b = MappingFunction::Scale(ScaleMapping::linear([0.0, 1.0]));
        let c = MappingFunction::Scale(ScaleMapping::new([0.0, 1.0], ScaleType::Sqrt, [0.0, 1.0]));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let s1 = MappingFunction::Script(ScriptMapping::new([0.0, 1.0], "value"));
        let s2 = MappingFunction::Script(ScriptMapping::new([5.0, 9.0], "value"));
        assert_eq!(s1, s2);
        assert_ne!(a, s1);
    }

    #[test]
    fn test_dump_restore() {
        let m = MappingFunction::Scale(ScaleMapping::new([1.0, 9.0], ScaleType::Pow3, [0.0, 1.0]));
        let dump = m.dump();
        assert_eq!(dump.type_name, "pow3");
        assert_eq!(MappingFunction::restore(&dump), m);

        let json = serde_json::json!({"type": "script", "code": "value"});
        let dump: MappingDump = serde_json::from_value(json).unwrap();
        let restored = MappingFunction::restore(&dump);
        assert!(matches!(&restored, MappingFunction::Script(s) if s.code() == "value"));
    }
}
