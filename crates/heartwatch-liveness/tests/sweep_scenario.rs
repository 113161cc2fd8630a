use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use heartwatch_liveness::{AlertSink, LivenessClass, LivenessRegistry, Sweeper};
use heartwatch_types::{AlertEvent, AlertKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CollectingSink(Mutex<Vec<AlertEvent>>);

impl AlertSink for CollectingSink {
    fn emit(&self, alert: &AlertEvent) {
        self.0.lock().unwrap().push(alert.clone());
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 13, 0, 0).unwrap()
}

#[test]
fn only_reporting_service_stays_ok() {
    let sweep_interval = Duration::from_secs(3);
    let threshold = sweep_interval * 2;
    let registry = Arc::new(LivenessRegistry::new());
    let sink = Arc::new(CollectingSink::default());
    let sweeper = Sweeper::new(
        Arc::clone(&registry),
        vec!["A".to_string(), "B".to_string(), "C".to_string()],
        threshold,
    )
    .with_sink(sink.clone());

    // A reports every 3 s; B and C never do.
    for secs in [0, 3, 6] {
        registry.record_report("A", start() + ChronoDuration::seconds(secs), 0.05);
    }

    let report = sweeper.tick(start() + ChronoDuration::seconds(7));

    let classes: Vec<_> = report
        .services
        .iter()
        .map(|s| (s.service_name.as_str(), s.class))
        .collect();
    assert_eq!(
        classes,
        vec![
            ("A", LivenessClass::Ok),
            ("B", LivenessClass::NeverSeen),
            ("C", LivenessClass::NeverSeen),
        ]
    );

    let alerts = sink.0.lock().unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.kind == AlertKind::NeverSeen));
    assert!(alerts.iter().all(|a| a.service_name != "A"));
}

#[test]
fn silent_service_times_out_without_new_reports() {
    let registry = Arc::new(LivenessRegistry::new());
    let sweeper = Sweeper::new(
        Arc::clone(&registry),
        vec!["A".to_string()],
        Duration::from_secs(6),
    );
    registry.record_report("A", start(), 0.0);

    let mut previous = LivenessClass::Ok;
    for secs in (0..=30).step_by(3) {
        let report = sweeper.evaluate(start() + ChronoDuration::seconds(secs));
        let class = report.services[0].class;
        if previous == LivenessClass::TimedOut {
            assert_eq!(class, LivenessClass::TimedOut, "timeout must not clear itself");
        }
        if secs <= 6 {
            assert_eq!(class, LivenessClass::Ok);
        } else {
            assert_eq!(class, LivenessClass::TimedOut);
            assert_eq!(report.alerts[0].since, Some(start()));
        }
        previous = class;
    }
}
