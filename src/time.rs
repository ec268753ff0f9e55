//! Time series
//!
//! A time series is an increasing list of times at which time-varying values are stored.
//! Series are shared: a [TimeSeriesSet] holds one series for each distinct list of times.

use crate::types::{Error, FeValue, Result};
use itertools::Itertools;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

/// The position of a time within a series, for linear interpolation
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct TimeInterpolation {
    /// The index of the time at or before the requested time
    pub index_one: usize,
    /// The index of the time at or after the requested time
    pub index_two: usize,
    /// The interpolation fraction between the two times, in [0, 1]
    pub xi: FeValue,
    /// False if the requested time was outside the series, in which case both indices
    /// are the nearest end and `xi` is 0
    pub in_range: bool,
}

/// How the times of one series relate to those of another
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TimeSeriesMapping {
    /// The series have the same times
    Identical,
    /// The times of the first series are the first times of the second
    Append,
    /// Any other relation
    Unknown,
}

/// An increasing list of times
#[derive(Debug, PartialEq, Clone)]
pub struct TimeSeries {
    times: Vec<FeValue>,
}

impl TimeSeries {
    /// Create a time series
    ///
    /// The times must be finite and strictly increasing.
    pub fn new(times: &[FeValue]) -> Result<Self> {
        if times.is_empty() {
            return Err(Error::InvalidArgument(
                "a time series needs at least one time".to_string(),
            ));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "times must be finite: {times:?}"
            )));
        }
        if times.iter().tuple_windows().any(|(a, b)| a >= b) {
            return Err(Error::InvalidArgument(format!(
                "times must be strictly increasing: {times:?}"
            )));
        }
        Ok(Self {
            times: times.to_vec(),
        })
    }

    /// The times
    pub fn times(&self) -> &[FeValue] {
        &self.times
    }

    /// The number of times
    pub fn number_of_times(&self) -> usize {
        self.times.len()
    }

    /// The time at an index
    pub fn time(&self, index: usize) -> Option<FeValue> {
        self.times.get(index).copied()
    }

    /// The first and last times
    pub fn range(&self) -> (FeValue, FeValue) {
        (self.times[0], self.times[self.times.len() - 1])
    }

    /// The index of a time that is exactly in the series
    pub fn index_for_time(&self, time: FeValue) -> Option<usize> {
        for (index, t) in self.times.iter().enumerate() {
            if *t == time {
                return Some(index);
            }
            if *t > time {
                break;
            }
        }
        None
    }

    /// Find the times either side of a time and the fraction of the way between them
    pub fn interpolation_for_time(&self, time: FeValue) -> TimeInterpolation {
        let last = self.times.len() - 1;
        let (first_time, last_time) = self.range();
        if time <= first_time {
            return TimeInterpolation {
                index_one: 0,
                index_two: 0,
                xi: 0.0,
                in_range: time == first_time,
            };
        }
        if time >= last_time {
            return TimeInterpolation {
                index_one: last,
                index_two: last,
                xi: 0.0,
                in_range: time == last_time,
            };
        }
        // First index with a time greater than or equal to the requested time
        let upper = self.times.partition_point(|t| *t < time);
        if self.times[upper] == time {
            return TimeInterpolation {
                index_one: upper,
                index_two: upper,
                xi: 0.0,
                in_range: true,
            };
        }
        let lower = upper - 1;
        TimeInterpolation {
            index_one: lower,
            index_two: upper,
            xi: (time - self.times[lower]) / (self.times[upper] - self.times[lower]),
            in_range: true,
        }
    }

    /// The index of the time nearest to a time
    pub fn nearest_time_index(&self, time: FeValue) -> usize {
        let interpolation = self.interpolation_for_time(time);
        if interpolation.xi < 0.5 {
            interpolation.index_one
        } else {
            interpolation.index_two
        }
    }

    /// How the times of this series relate to those of another
    pub fn mapping_to(&self, destination: &TimeSeries) -> TimeSeriesMapping {
        if self.times == destination.times {
            TimeSeriesMapping::Identical
        } else if destination.times.starts_with(&self.times) {
            TimeSeriesMapping::Append
        } else {
            TimeSeriesMapping::Unknown
        }
    }

    /// For each time of this series, its index in another series
    pub fn indices_in(&self, destination: &TimeSeries) -> Result<Vec<usize>> {
        self.times
            .iter()
            .map(|t| {
                destination.index_for_time(*t).ok_or_else(|| {
                    Error::IncompatibleStructure(format!("time {t} is not in the destination"))
                })
            })
            .collect()
    }
}

fn key(times: &[FeValue]) -> Vec<u64> {
    times.iter().map(|t| t.to_bits()).collect()
}

/// The set of distinct time series used in a region
#[derive(Debug, Default)]
pub struct TimeSeriesSet {
    series: HashMap<Vec<u64>, Rc<TimeSeries>>,
}

impl TimeSeriesSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Does the set hold this series?
    pub fn contains(&self, series: &Rc<TimeSeries>) -> bool {
        self.series
            .get(&key(&series.times))
            .map(|s| Rc::ptr_eq(s, series))
            .unwrap_or(false)
    }

    /// Get the series with exactly these times, creating it if it does not exist
    pub fn get_or_create_matching(&mut self, times: &[FeValue]) -> Result<Rc<TimeSeries>> {
        let k = key(times);
        if let Some(series) = self.series.get(&k) {
            return Ok(Rc::clone(series));
        }
        let series = Rc::new(TimeSeries::new(times)?);
        debug!("Created time series with {} times", times.len());
        self.series.insert(k, Rc::clone(&series));
        Ok(series)
    }

    /// Get the series whose times are the union of the times of two series
    pub fn merge(
        &mut self,
        first: &Rc<TimeSeries>,
        second: &Rc<TimeSeries>,
    ) -> Result<Rc<TimeSeries>> {
        if Rc::ptr_eq(first, second) {
            return Ok(Rc::clone(first));
        }
        let times = first
            .times
            .iter()
            .merge(second.times.iter())
            .dedup()
            .copied()
            .collect::<Vec<_>>();
        self.get_or_create_matching(&times)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::*;

    #[test]
    fn test_invalid_series() {
        assert!(TimeSeries::new(&[]).is_err());
        assert!(TimeSeries::new(&[0.0, 0.0]).is_err());
        assert!(TimeSeries::new(&[1.0, 0.0]).is_err());
        assert!(TimeSeries::new(&[0.0, FeValue::NAN]).is_err());
    }

    #[test]
    fn test_index_for_time() {
        let series = TimeSeries::new(&[0.0, 2.0, 4.0]).unwrap();
        assert_eq!(series.index_for_time(2.0), Some(1));
        assert_eq!(series.index_for_time(4.0), Some(2));
        assert_eq!(series.index_for_time(1.0), None);
        assert_eq!(series.index_for_time(5.0), None);
    }

    #[test]
    fn test_interpolation() {
        let series = TimeSeries::new(&[0.0, 2.0, 4.0]).unwrap();
        let i = series.interpolation_for_time(1.0);
        assert_eq!((i.index_one, i.index_two), (0, 1));
        assert_relative_eq!(i.xi, 0.5);
        assert!(i.in_range);

        let i = series.interpolation_for_time(-1.0);
        assert_eq!((i.index_one, i.index_two, i.xi), (0, 0, 0.0));
        assert!(!i.in_range);

        let i = series.interpolation_for_time(10.0);
        assert_eq!((i.index_one, i.index_two, i.xi), (2, 2, 0.0));
        assert!(!i.in_range);

        let i = series.interpolation_for_time(2.0);
        assert_eq!((i.index_one, i.index_two, i.xi), (1, 1, 0.0));
        assert!(i.in_range);

        let i = series.interpolation_for_time(3.5);
        assert_eq!((i.index_one, i.index_two), (1, 2));
        assert_relative_eq!(i.xi, 0.75);
    }

    #[test]
    fn test_nearest_time_index() {
        let series = TimeSeries::new(&[0.0, 2.0, 4.0]).unwrap();
        assert_eq!(series.nearest_time_index(0.9), 0);
        assert_eq!(series.nearest_time_index(1.0), 1);
        assert_eq!(series.nearest_time_index(3.2), 2);
        assert_eq!(series.nearest_time_index(-3.0), 0);
    }

    #[test]
    fn test_mapping() {
        let a = TimeSeries::new(&[0.0, 1.0]).unwrap();
        let b = TimeSeries::new(&[0.0, 1.0, 2.0]).unwrap();
        let c = TimeSeries::new(&[0.5, 1.0]).unwrap();
        assert_eq!(a.mapping_to(&a), TimeSeriesMapping::Identical);
        assert_eq!(a.mapping_to(&b), TimeSeriesMapping::Append);
        assert_eq!(b.mapping_to(&a), TimeSeriesMapping::Unknown);
        assert_eq!(c.mapping_to(&b), TimeSeriesMapping::Unknown);
        assert_eq!(a.indices_in(&b).unwrap(), vec![0, 1]);
        assert!(c.indices_in(&b).is_err());
    }

    #[test]
    fn test_set_deduplicates() {
        let mut set = TimeSeriesSet::new();
        let a = set.get_or_create_matching(&[0.0, 1.0, 2.0]).unwrap();
        let b = set.get_or_create_matching(&[0.0, 1.0, 2.0]).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&a));
        let other = Rc::new(TimeSeries::new(&[0.0, 1.0, 2.0]).unwrap());
        assert!(!set.contains(&other));
    }

    #[test]
    fn test_merge() {
        let mut set = TimeSeriesSet::new();
        let a = set.get_or_create_matching(&[0.0, 2.0, 4.0]).unwrap();
        let b = set.get_or_create_matching(&[1.0, 2.0, 3.0]).unwrap();
        let merged = set.merge(&a, &b).unwrap();
        assert_eq!(merged.times(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(Rc::ptr_eq(&set.merge(&a, &a).unwrap(), &a));
        let again = set.get_or_create_matching(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(Rc::ptr_eq(&merged, &again));
        assert_eq!(set.len(), 3);
    }
}
