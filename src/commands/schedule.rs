// pg-r2-backup/src/commands/schedule.rs

/// Ways to run the backup on a timer outside of `daemon`.
pub fn guidance() -> &'static str {
    "Scheduling backups

Built-in scheduler:
  pg-r2-backup daemon
  Runs one backup immediately, then daily at BACKUP_TIME (UTC).

Linux / macOS (cron), daily at 00:00:
  0 0 * * * pg-r2-backup run

Windows Task Scheduler:
  Program: pg-r2-backup
  Args:    run
  Start in: folder containing .env

Railway / Docker:
  Run `pg-r2-backup daemon` as the container command, or use the
  platform's cron feature with `pg-r2-backup run`."
}

pub fn execute() {
    println!("{}", guidance());
}
