use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

/// Set up console logging on stderr at the requested level. Call once, at
/// program start, before any log macros run.
pub fn init_logging(level: log::LevelFilter) {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({d(%Y-%m-%d %H:%M:%S)} [{l}])} {m}{n}",
        )))
        .target(Target::Stderr)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))
        .expect("Failed to configure logger");

    log4rs::init_config(config).expect("Failed to initialize logger");
}
