//! What a failing suite writes to the log

mod common;

use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

use common::{runner, workspace, FakeEngine};
use rfverify::{Locator, Scenario, Step, Suite};

struct Recorder {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for Recorder {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static RECORDER: Recorder = Recorder {
    records: Mutex::new(Vec::new()),
};

#[test]
fn failed_scenario_is_reported_once() {
    log::set_logger(&RECORDER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let (dir, doc) = workspace();
    let broken = Scenario::new("broken", doc.to_string_lossy().into_owned())
        .step(Step::assert_visible(Locator::css(".does-not-exist")).with_timeout(20));
    let report = Suite::new(runner(dir.path()), vec![broken])
        .run_blocking::<FakeEngine>()
        .unwrap();
    assert_eq!(report.failed, 1);

    let records = RECORDER.records.lock().unwrap();
    let loud: Vec<_> = records
        .iter()
        .filter(|(level, msg)| *level <= Level::Warn && msg.contains("'broken'"))
        .collect();
    assert_eq!(loud.len(), 1, "{:#?}", loud);
    assert_eq!(loud[0].0, Level::Error);
    assert!(records
        .iter()
        .any(|(level, msg)| *level == Level::Debug && msg.contains("scenario 'broken' failed at step 1")));
}
