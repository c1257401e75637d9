//! Fuzz target for the Origin / Sec-Fetch-Site decision.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use armature_csrf::{CrossOriginResult, CrossOriginValidator};

#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    trusted: Vec<String>,
    origin: Option<String>,
    sec_fetch_site: Option<String>,
    host: Option<String>,
}

fuzz_target!(|data: FuzzRequest| {
    let validator = CrossOriginValidator::new(&data.trusted);
    let result = validator.validate(
        data.origin.as_deref(),
        data.sec_fetch_site.as_deref(),
        data.host.as_deref(),
    );

    // A trusted origin is always allowed, whatever the metadata says.
    if let Some(origin) = data.origin.as_deref() {
        let trusted = !origin.is_empty()
            && !origin.eq_ignore_ascii_case("null")
            && data.trusted.iter().any(|t| t.eq_ignore_ascii_case(origin));
        if trusted {
            assert_eq!(result, CrossOriginResult::Allowed);
        }
    }
});
