//! Console progress for long batches.

use std::time::Duration;

/// Cumulative moving average of per-unit durations.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningAverage {
    count: u64,
    mean: f64,
}

impl RunningAverage {
    pub fn update(&mut self, sample: f64) -> f64 {
        self.count += 1;
        self.mean += (sample - self.mean) / self.count as f64;
        self.mean
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

/// Shared progress state for one pipeline stage. Lives behind a mutex; the
/// workers report each finished unit through it.
#[derive(Debug)]
pub struct StageProgress {
    total: usize,
    workers: usize,
    completed: usize,
    average: RunningAverage,
    last_printed_percent: i64,
}

impl StageProgress {
    pub fn new(total: usize, workers: usize) -> Self {
        StageProgress {
            total,
            workers: workers.max(1),
            completed: 0,
            average: RunningAverage::default(),
            last_printed_percent: -1,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn average_secs(&self) -> f64 {
        self.average.mean()
    }

    fn percent(&self) -> i64 {
        if self.total == 0 {
            return 100;
        }
        (self.completed as f64 / self.total as f64 * 100.0).round() as i64
    }

    /// Record a translated definition and print a per-file progress line.
    pub fn note_converted(&mut self, name: &str) {
        self.completed += 1;
        println!(
            "{} ({}/{}) - {}%",
            name,
            self.completed,
            self.total,
            self.percent()
        );
    }

    /// Record an executed unit and print percent plus remaining-time
    /// estimate, but only when the rounded percentage has moved.
    pub fn note_executed(&mut self, elapsed: Duration) {
        self.completed += 1;
        let last = elapsed.as_secs_f64();
        let average = self.average.update(last);
        let percent = self.percent();
        if percent != self.last_printed_percent {
            self.last_printed_percent = percent;
            let remaining = (self.total - self.completed) as f64;
            let eta = remaining * average / self.workers as f64 + last;
            println!(
                "{}% complete ({}/{}), est. time remaining: {}",
                percent,
                self.completed,
                self.total,
                format_hms(eta)
            );
        }
    }
}

/// `h:mm:ss` rendering of a duration in seconds.
pub fn format_hms(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_is_cumulative() {
        let mut avg = RunningAverage::default();
        assert_eq!(avg.update(4.0), 4.0);
        assert_eq!(avg.update(8.0), 6.0);
        assert_eq!(avg.update(6.0), 6.0);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        let mut progress = StageProgress::new(3, 2);
        assert_eq!(progress.percent(), 0);
        progress.completed = 1;
        assert_eq!(progress.percent(), 33);
        progress.completed = 2;
        assert_eq!(progress.percent(), 67);
        progress.completed = 3;
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn empty_stage_reads_complete() {
        let progress = StageProgress::new(0, 4);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn durations_render_hms() {
        assert_eq!(format_hms(0.0), "0:00:00");
        assert_eq!(format_hms(61.4), "0:01:01");
        assert_eq!(format_hms(3725.0), "1:02:05");
    }
}
