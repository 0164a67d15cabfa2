use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ym::YearMonth;

// ---------------------------------------------------------------------------
// Scope values
// ---------------------------------------------------------------------------

/// One dimension of an observation scope: either a concrete set of codes
/// (airports or airlines) or the wildcard "all of them".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeValue {
    Wildcard,
    Specific(BTreeSet<String>),
}

impl ScopeValue {
    pub fn of<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScopeValue::Specific(codes.into_iter().map(Into::into).collect())
    }

    pub fn single(code: impl Into<String>) -> Self {
        ScopeValue::of([code.into()])
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ScopeValue::Wildcard)
    }

    /// Whether the value covers `code`. Wildcard covers everything.
    pub fn contains(&self, code: &str) -> bool {
        match self {
            ScopeValue::Wildcard => true,
            ScopeValue::Specific(codes) => codes.contains(code),
        }
    }

    /// Whether two values can describe at least one common code.
    pub fn intersects(&self, other: &ScopeValue) -> bool {
        match (self, other) {
            (ScopeValue::Wildcard, _) | (_, ScopeValue::Wildcard) => true,
            (ScopeValue::Specific(a), ScopeValue::Specific(b)) => !a.is_disjoint(b),
        }
    }

    /// The code, if the value names exactly one.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ScopeValue::Wildcard => None,
            ScopeValue::Specific(codes) => {
                if codes.len() == 1 {
                    codes.iter().next().map(String::as_str)
                } else {
                    None
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The unit of matching: what slice of real-world traffic an external record
/// claims to describe.
///
/// `both_ways` marks an undirected origin/destination pair; such a scope
/// matches segments in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub origin: ScopeValue,
    pub destination: ScopeValue,
    pub airline: ScopeValue,
    pub airline_ref_code: ScopeValue,
    pub months: BTreeSet<YearMonth>,
    pub both_ways: bool,
}

impl Scope {
    /// Whether two scopes can describe the same real-world traffic.
    ///
    /// Months must intersect, airlines must intersect (wildcard matches
    /// anything), and the origin/destination pairs must intersect either
    /// directly or — when at least one side is `both_ways` — reversed.
    pub fn overlaps(&self, other: &Scope) -> bool {
        if self.months.is_disjoint(&other.months) {
            return false;
        }
        if !self.airline.intersects(&other.airline) {
            return false;
        }
        let direct = self.origin.intersects(&other.origin)
            && self.destination.intersects(&other.destination);
        let reversed = (self.both_ways || other.both_ways)
            && self.origin.intersects(&other.destination)
            && self.destination.intersects(&other.origin);
        direct || reversed
    }

    fn od_match(&self, origin: &str, destination: &str) -> bool {
        let direct = self.origin.contains(origin) && self.destination.contains(destination);
        let reversed = self.both_ways
            && self.origin.contains(destination)
            && self.destination.contains(origin);
        direct || reversed
    }

    /// Whether a directed ground-truth row falls under this scope.
    pub fn matches_segment(
        &self,
        origin: &str,
        destination: &str,
        airline: &str,
        ym: YearMonth,
    ) -> bool {
        self.months.contains(&ym)
            && self.airline.contains(airline)
            && self.od_match(origin, destination)
    }

    /// Whether a capacity row falls under this scope. The airline reference
    /// code only constrains the match when the airline set is specific.
    pub fn matches_capacity(
        &self,
        origin: &str,
        destination: &str,
        airline: &str,
        airline_ref_code: &str,
        ym: YearMonth,
    ) -> bool {
        if !self.matches_segment(origin, destination, airline, ym) {
            return false;
        }
        self.airline.is_wildcard() || self.airline_ref_code.contains(airline_ref_code)
    }

    /// Atomic scopes name exactly one origin, destination, airline, reference
    /// code and month; only those can be turned into a segment verbatim.
    pub fn is_atomic(&self) -> bool {
        self.as_atomic().is_some()
    }

    /// The single (origin, destination, airline, reference code, month) an
    /// atomic scope names.
    pub fn as_atomic(&self) -> Option<AtomicScope<'_>> {
        if self.months.len() != 1 {
            return None;
        }
        Some(AtomicScope {
            origin: self.origin.as_single()?,
            destination: self.destination.as_single()?,
            airline: self.airline.as_single()?,
            airline_ref_code: self.airline_ref_code.as_single()?,
            month: *self.months.iter().next()?,
        })
    }
}

/// Borrowed view of an atomic scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicScope<'a> {
    pub origin: &'a str,
    pub destination: &'a str,
    pub airline: &'a str,
    pub airline_ref_code: &'a str,
    pub month: YearMonth,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn scope(origin: ScopeValue, destination: ScopeValue, airline: ScopeValue, m: &str) -> Scope {
        Scope {
            origin,
            destination,
            airline: airline.clone(),
            airline_ref_code: airline,
            months: [ym(m)].into(),
            both_ways: false,
        }
    }

    #[test]
    fn direct_overlap() {
        let a = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::single("AF"),
            "2017-03",
        );
        let b = scope(
            ScopeValue::of(["CDG", "ORY"]),
            ScopeValue::single("JFK"),
            ScopeValue::Wildcard,
            "2017-03",
        );
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn disjoint_months_never_overlap() {
        let a = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::Wildcard,
            "2017-03",
        );
        let b = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::Wildcard,
            "2017-04",
        );
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn disjoint_airlines_never_overlap() {
        let a = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::single("AF"),
            "2017-03",
        );
        let b = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::single("DL"),
            "2017-03",
        );
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn reversed_overlap_needs_both_ways() {
        let a = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::Wildcard,
            "2017-03",
        );
        let b = scope(
            ScopeValue::single("JFK"),
            ScopeValue::single("CDG"),
            ScopeValue::Wildcard,
            "2017-03",
        );
        assert!(!a.overlaps(&b));

        let mut a_both = a.clone();
        a_both.both_ways = true;
        assert!(a_both.overlaps(&b));
        // Symmetric: the flag on either side is enough.
        assert!(b.overlaps(&a_both));
    }

    #[test]
    fn wildcard_endpoints_overlap_anything() {
        let a = scope(
            ScopeValue::Wildcard,
            ScopeValue::Wildcard,
            ScopeValue::Wildcard,
            "2017-03",
        );
        let b = scope(
            ScopeValue::single("GRU"),
            ScopeValue::single("EZE"),
            ScopeValue::single("JJ"),
            "2017-03",
        );
        assert!(a.overlaps(&b));
    }

    #[test]
    fn segment_match_honors_direction() {
        let mut s = scope(
            ScopeValue::single("CDG"),
            ScopeValue::single("JFK"),
            ScopeValue::Wildcard,
            "2017-03",
        );
        assert!(s.matches_segment("CDG", "JFK", "AF", ym("2017-03")));
        assert!(!s.matches_segment("JFK", "CDG", "AF", ym("2017-03")));
        s.both_ways = true;
        assert!(s.matches_segment("JFK", "CDG", "AF", ym("2017-03")));
    }

    #[test]
    fn capacity_match_gates_ref_code_on_specific_airline() {
        let s = Scope {
            origin: ScopeValue::single("CDG"),
            destination: ScopeValue::single("JFK"),
            airline: ScopeValue::single("AF"),
            airline_ref_code: ScopeValue::single("AFR"),
            months: [ym("2017-03")].into(),
            both_ways: false,
        };
        assert!(s.matches_capacity("CDG", "JFK", "AF", "AFR", ym("2017-03")));
        assert!(!s.matches_capacity("CDG", "JFK", "AF", "AFX", ym("2017-03")));

        let mut all = s.clone();
        all.airline = ScopeValue::Wildcard;
        assert!(all.matches_capacity("CDG", "JFK", "DL", "DAL", ym("2017-03")));
    }

    #[test]
    fn atomicity() {
        let s = Scope {
            origin: ScopeValue::single("CDG"),
            destination: ScopeValue::single("JFK"),
            airline: ScopeValue::single("AF"),
            airline_ref_code: ScopeValue::single("AFR"),
            months: [ym("2017-03")].into(),
            both_ways: false,
        };
        assert!(s.is_atomic());

        let mut multi = s.clone();
        multi.months.insert(ym("2017-04"));
        assert!(!multi.is_atomic());

        let mut wild = s;
        wild.airline = ScopeValue::Wildcard;
        assert!(!wild.is_atomic());
    }
}
