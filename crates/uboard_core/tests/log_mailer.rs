use log::{LevelFilter, Log, Metadata, Record};
use std::sync::Mutex;
use uboard_core::{LogMailer, Mailer, OutboundEmail};

struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};

#[test]
fn log_mailer_writes_recipient_subject_and_link() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    let message = OutboundEmail {
        to: "jane@utoronto.ca".to_string(),
        subject: "Confirm your UBoard account".to_string(),
        body: "Hi jane".to_string(),
        link: "https://uboard.test/confirm-email?token=abc123".to_string(),
    };
    LogMailer.send(&message).unwrap();

    let lines = LOGGER.lines.lock().unwrap();
    let line = lines
        .iter()
        .find(|line| line.contains("event=mail_send"))
        .expect("mail line should be logged");
    assert!(line.contains("to=jane@utoronto.ca"));
    assert!(line.contains("subject=\"Confirm your UBoard account\""));
    assert!(line.contains("link=https://uboard.test/confirm-email?token=abc123"));
}
