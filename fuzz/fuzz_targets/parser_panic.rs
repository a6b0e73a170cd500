#![no_main]
use libfuzzer_sys::fuzz_target;
use texmill_log::LogParser;

fuzz_target!(|data: &[u8]| {
    // Logs are read lossily, so arbitrary bytes are fair input.
    let text = String::from_utf8_lossy(data);
    let _ = LogParser::new().parse(&text);
});
