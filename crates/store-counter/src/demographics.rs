//! Demographic histograms and percentage views derived from them.
//!
//! Counts are the only stored form. Percentages are computed on every read
//! with largest-remainder apportionment: each share is the floor or ceiling
//! of `100 * count / denominator`, a zero denominator yields 0% everywhere,
//! and the shares of a fully labelled category add up to exactly 100.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AgeBand, Gender};

/// Count per label. Zero entries are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram<K: Ord> {
    counts: BTreeMap<K, u64>,
}

pub type AgeHistogram = Histogram<AgeBand>;
pub type GenderHistogram = Histogram<Gender>;

impl<K: Ord> Default for Histogram<K> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy> Histogram<K> {
    pub fn get(&self, key: K) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Decrement without going below zero.
    pub fn decrement(&mut self, key: K) {
        if let Some(count) = self.counts.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&key);
            }
        }
    }

    pub fn merge(&mut self, other: &Histogram<K>) {
        for (key, count) in &other.counts {
            *self.counts.entry(*key).or_insert(0) += count;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, u64)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

impl<K: Ord + Copy> FromIterator<K> for Histogram<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut histogram = Histogram::default();
        for key in iter {
            histogram.increment(key);
        }
        histogram
    }
}

/// One label's count and share of the denominator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicShare<K> {
    pub label: K,
    pub count: u64,
    pub percent: u8,
}

/// Age and gender shares against one denominator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemographicBreakdown {
    pub denominator: u64,
    pub age: Vec<DemographicShare<AgeBand>>,
    pub gender: Vec<DemographicShare<Gender>>,
    /// People without a reported gender label.
    pub unlabeled: u64,
}

impl DemographicBreakdown {
    pub fn from_histograms(
        age: &AgeHistogram,
        gender: &GenderHistogram,
        denominator: u64,
    ) -> Self {
        let age_counts: Vec<u64> = AgeBand::ALL.iter().map(|b| age.get(*b)).collect();
        let age_percents = apportion(&age_counts, denominator);

        let gender_counts: Vec<u64> = Gender::REPORTED.iter().map(|g| gender.get(*g)).collect();
        let gender_percents = apportion(&gender_counts, denominator);

        Self {
            denominator,
            age: AgeBand::ALL
                .iter()
                .zip(age_counts.iter().zip(age_percents))
                .map(|(label, (count, percent))| DemographicShare {
                    label: *label,
                    count: *count,
                    percent,
                })
                .collect(),
            gender: Gender::REPORTED
                .iter()
                .zip(gender_counts.iter().zip(gender_percents))
                .map(|(label, (count, percent))| DemographicShare {
                    label: *label,
                    count: *count,
                    percent,
                })
                .collect(),
            unlabeled: denominator.saturating_sub(gender_counts.iter().sum()),
        }
    }

    pub fn age_percent(&self, band: AgeBand) -> u8 {
        self.age
            .iter()
            .find(|s| s.label == band)
            .map(|s| s.percent)
            .unwrap_or(0)
    }

    pub fn gender_percent(&self, gender: Gender) -> u8 {
        self.gender
            .iter()
            .find(|s| s.label == gender)
            .map(|s| s.percent)
            .unwrap_or(0)
    }
}

/// Split 100 points across `counts` in proportion to `denominator`.
///
/// Whatever `counts` leave of the denominator takes part in the split as a
/// hidden remainder category, so reported shares never exceed 100 in total.
pub fn apportion(counts: &[u64], denominator: u64) -> Vec<u8> {
    if denominator == 0 {
        return vec![0; counts.len()];
    }

    let listed: u64 = counts.iter().sum();
    let mut parts: Vec<u64> = counts.to_vec();
    parts.push(denominator.saturating_sub(listed));
    let denominator = denominator.max(listed);

    let mut shares: Vec<u64> = Vec::with_capacity(parts.len());
    let mut remainders: Vec<(u64, usize)> = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        let scaled = u128::from(*part) * 100;
        let den = u128::from(denominator);
        shares.push((scaled / den) as u64);
        remainders.push(((scaled % den) as u64, i));
    }

    let assigned: u64 = shares.iter().sum();
    let mut leftover = 100u64.saturating_sub(assigned);
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (remainder, i) in remainders {
        if leftover == 0 || remainder == 0 {
            break;
        }
        shares[i] += 1;
        leftover -= 1;
    }

    shares.truncate(counts.len());
    shares.into_iter().map(|s| s.min(100) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominator_is_all_zero() {
        assert_eq!(apportion(&[0, 0, 0, 0], 0), vec![0, 0, 0, 0]);
        assert_eq!(apportion(&[], 0), Vec::<u8>::new());
    }

    #[test]
    fn test_even_split() {
        assert_eq!(apportion(&[1, 1], 2), vec![50, 50]);
        assert_eq!(apportion(&[1, 0, 0, 0], 1), vec![100, 0, 0, 0]);
    }

    #[test]
    fn test_fully_labelled_sums_to_100() {
        // Plain rounding would give 13 + 13 + 38 + 38 = 102.
        let shares = apportion(&[1, 1, 3, 3], 8);
        assert_eq!(shares.iter().map(|s| u32::from(*s)).sum::<u32>(), 100);

        let shares = apportion(&[1, 1, 1], 3);
        assert_eq!(shares, vec![34, 33, 33]);
    }

    #[test]
    fn test_unlabelled_remainder_is_hidden() {
        // 1 male, 1 female, 1 unknown.
        let shares = apportion(&[1, 1], 3);
        let sum: u32 = shares.iter().map(|s| u32::from(*s)).sum();
        assert!(sum <= 100);
        assert_eq!(shares, vec![34, 33]);
    }

    #[test]
    fn test_shares_stay_near_exact_value() {
        for denominator in 1..=40u64 {
            let counts = [denominator / 3, denominator / 5, denominator / 7];
            let shares = apportion(&counts, denominator);
            for (count, share) in counts.iter().zip(shares) {
                let exact = (*count as f64) * 100.0 / denominator as f64;
                assert!((f64::from(share) - exact).abs() < 1.0);
            }
        }
    }

    #[test]
    fn test_histogram_decrement_removes_empty() {
        let mut h = GenderHistogram::default();
        h.increment(Gender::Male);
        h.decrement(Gender::Male);
        h.decrement(Gender::Female);
        assert!(h.is_empty());
        assert_eq!(h, GenderHistogram::default());
    }

    #[test]
    fn test_breakdown_excludes_unknown_gender() {
        let gender: GenderHistogram = [Gender::Male, Gender::Unknown].into_iter().collect();
        let age: AgeHistogram = [AgeBand::Over55, AgeBand::Over55].into_iter().collect();
        let breakdown = DemographicBreakdown::from_histograms(&age, &gender, 2);

        assert_eq!(breakdown.gender.len(), 2);
        assert_eq!(breakdown.gender_percent(Gender::Male), 50);
        assert_eq!(breakdown.gender_percent(Gender::Female), 0);
        assert_eq!(breakdown.unlabeled, 1);
        assert_eq!(breakdown.age_percent(AgeBand::Over55), 100);
    }

    #[test]
    fn test_histogram_serializes_as_map() {
        let age: AgeHistogram = [AgeBand::Under18, AgeBand::From18To34, AgeBand::Under18]
            .into_iter()
            .collect();
        let json = serde_json::to_value(&age).unwrap();
        assert_eq!(json, serde_json::json!({ "0-17": 2, "18-34": 1 }));
    }
}
