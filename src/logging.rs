use log::LevelFilter;
use std::io;

/// Initialize logging with the fern logger.
///
/// Logs go to stderr; a log file at /tmp/imgresize.log is chained in on a
/// best-effort basis so a failed run leaves a trail.
pub fn log(filter: LevelFilter) -> Result<(), fern::InitError> {
    let mut logger = fern::Dispatch::new()
        .level(filter)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} imgresize{}] {}",
                record.level(),
                match (record.file(), record.line()) {
                    (Some(file), Some(line)) => format!(":{}:{}", file, line),
                    _ => "".into(),
                },
                message
            ))
        })
        .chain(io::stderr());

    match fern::log_file("/tmp/imgresize.log") {
        Ok(log) => logger = logger.chain(log),
        Err(why) => {
            eprintln!("failed to create log file at /tmp/imgresize.log: {}", why);
        }
    }

    logger.apply()?;
    Ok(())
}
