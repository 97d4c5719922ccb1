//! Best-effort process metadata lookup
//!
//! For every GPU process the query tool reports we run one `ps` on the same
//! host to learn its owner, start time, elapsed time and full command line.
//! Nothing here can fail a probe: a missing process, a slow `ps` or a broken
//! channel just leaves the fields unset.

use gpufleet_remote::RemoteSession;
use gpufleet_telemetry::ProcessRecord;
use std::time::Duration;
use tracing::debug;

/// Columns requested from `ps`, in output order
pub const PS_COLUMNS: &str = "pid,ppid,user,start,etime,cmd";

/// OS metadata found for one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub user: Option<String>,
    pub start_time: Option<String>,
    pub elapsed_time: Option<String>,
    pub command: Option<String>,
    /// Whether anything was learned at all
    pub enriched: bool,
}

impl Enrichment {
    /// Interpret one line of `ps -o pid,ppid,user,start,etime,cmd` output.
    ///
    /// Three fields give the user; six give everything, with the command
    /// being the rest of the line including its own spaces.
    pub fn from_ps_line(line: &str) -> Self {
        let fields = split_fields(line.trim(), 6);
        let mut enrichment = Enrichment::default();

        if fields.len() >= 3 {
            enrichment.user = Some(fields[2].to_string());
        }
        if fields.len() >= 6 {
            enrichment.start_time = Some(fields[3].to_string());
            enrichment.elapsed_time = Some(fields[4].to_string());
            enrichment.command = Some(fields[5].to_string());
        }
        enrichment.enriched = enrichment.user.is_some();

        enrichment
    }

    /// Copy whatever was found onto `process`
    pub fn apply_to(self, process: &mut ProcessRecord) {
        if !self.enriched {
            return;
        }
        process.user = self.user.or(process.user.take());
        process.start_time = self.start_time.or(process.start_time.take());
        process.elapsed_time = self.elapsed_time.or(process.elapsed_time.take());
        process.command = self.command.or(process.command.take());
    }
}

/// `ps` invocation for `pid`, or `None` when `pid` is not a plain number
pub fn ps_command(pid: &str) -> Option<String> {
    let pid = pid.trim();
    if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("ps -p {} -o {} --no-headers", pid, PS_COLUMNS))
}

/// Look up OS metadata for `pid` on the session's host
pub async fn enrich_process(session: &dyn RemoteSession, pid: &str, timeout: Duration) -> Enrichment {
    let Some(command) = ps_command(pid) else {
        debug!("{}: not enriching non-numeric pid {:?}", session.host(), pid);
        return Enrichment::default();
    };

    match session.exec(&command, timeout).await {
        Ok(output) if output.success() => {
            let line = output.stdout.lines().map(str::trim).find(|l| !l.is_empty());
            match line {
                Some(line) => Enrichment::from_ps_line(line),
                None => Enrichment::default(),
            }
        }
        Ok(output) => {
            debug!(
                "{}: ps for pid {} exited with {:?}",
                session.host(),
                pid,
                output.exit_status
            );
            Enrichment::default()
        }
        Err(e) => {
            debug!("{}: ps for pid {} failed: {}", session.host(), pid, e);
            Enrichment::default()
        }
    }
}

/// Split on runs of whitespace into at most `max` fields; the last field
/// keeps the remainder of the line verbatim.
fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_start();

    while !rest.is_empty() && max > 0 {
        if fields.len() + 1 == max {
            fields.push(rest.trim_end());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpufleet_remote::{MockHost, MockReply, MockTransport, Transport};

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn test_split_fields_keeps_command_whitespace() {
        let fields = split_fields(
            "48213     1 alice    09:14:02    01:02:03 python  train.py --lr 0.1",
            6,
        );
        assert_eq!(
            fields,
            vec!["48213", "1", "alice", "09:14:02", "01:02:03", "python  train.py --lr 0.1"]
        );
    }

    #[test]
    fn test_split_fields_short_line() {
        assert_eq!(split_fields("  12 1  ", 6), vec!["12", "1"]);
        assert!(split_fields("", 6).is_empty());
    }

    #[test]
    fn test_from_ps_line_full() {
        let enrichment =
            Enrichment::from_ps_line("48213 1 alice Oct18 1-02:03:04 /usr/bin/python3 train.py");

        assert!(enrichment.enriched);
        assert_eq!(enrichment.user.as_deref(), Some("alice"));
        assert_eq!(enrichment.start_time.as_deref(), Some("Oct18"));
        assert_eq!(enrichment.elapsed_time.as_deref(), Some("1-02:03:04"));
        assert_eq!(enrichment.command.as_deref(), Some("/usr/bin/python3 train.py"));
    }

    #[test]
    fn test_from_ps_line_partial() {
        let enrichment = Enrichment::from_ps_line("48213 1 bob 10:00");
        assert_eq!(enrichment.user.as_deref(), Some("bob"));
        assert!(enrichment.command.is_none());
        assert!(enrichment.enriched);

        let enrichment = Enrichment::from_ps_line("48213 1");
        assert_eq!(enrichment, Enrichment::default());
    }

    #[test]
    fn test_ps_command_rejects_non_numeric_pid() {
        assert_eq!(
            ps_command("48213").as_deref(),
            Some("ps -p 48213 -o pid,ppid,user,start,etime,cmd --no-headers")
        );
        assert!(ps_command("Unknown").is_none());
        assert!(ps_command("1; rm -rf /").is_none());
        assert!(ps_command("").is_none());
    }

    #[test]
    fn test_apply_to_process() {
        let mut process = ProcessRecord {
            pid: "7".into(),
            ..Default::default()
        };
        Enrichment::from_ps_line("7 1 carol 08:00 00:10 sleep 100").apply_to(&mut process);

        assert_eq!(process.user.as_deref(), Some("carol"));
        assert_eq!(process.command.as_deref(), Some("sleep 100"));

        // An empty enrichment leaves existing values alone
        Enrichment::default().apply_to(&mut process);
        assert_eq!(process.user.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn test_enrich_process_over_session() {
        let transport = MockTransport::new().host(
            "node",
            MockHost::new()
                .reply("ps -p 100 ", MockReply::stdout("  100     1 dave 11:11 05:00 ./bench --all\n"))
                .reply("ps -p 200 ", MockReply::stderr("", 1))
                .reply("ps -p 300 ", MockReply::Hang),
        );
        let session = transport.connect("node", TIMEOUT).await.unwrap();

        let found = enrich_process(session.as_ref(), "100", TIMEOUT).await;
        assert_eq!(found.user.as_deref(), Some("dave"));
        assert_eq!(found.command.as_deref(), Some("./bench --all"));

        // Exited process, hung ps and bogus pid all degrade to nothing
        assert!(!enrich_process(session.as_ref(), "200", TIMEOUT).await.enriched);
        assert!(!enrich_process(session.as_ref(), "300", TIMEOUT).await.enriched);
        assert!(!enrich_process(session.as_ref(), "N/A", TIMEOUT).await.enriched);
        assert_eq!(transport.commands_run(), 3);
    }
}
