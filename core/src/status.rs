//! Status-code acceptance.

use std::ops::RangeInclusive;

use crate::error::StatusCodeError;
use crate::http::RequestOptions;

/// Decides whether a response status counts as success.
///
/// 2xx always succeeds. 3xx succeeds only when the request opted out of
/// redirect following: the transport then hands back the redirect itself as
/// the terminal response.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPolicy;

impl StatusPolicy {
    pub fn success_range(options: &RequestOptions) -> RangeInclusive<u16> {
        if options.follow_redirects {
            200..=299
        } else {
            200..=399
        }
    }

    pub fn validate(status: u16, options: &RequestOptions) -> Result<(), StatusCodeError> {
        if Self::success_range(options).contains(&status) {
            Ok(())
        } else {
            Err(StatusCodeError::new(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLLOW: RequestOptions = RequestOptions {
        follow_redirects: true,
    };
    const NO_FOLLOW: RequestOptions = RequestOptions {
        follow_redirects: false,
    };

    #[test]
    fn two_hundreds_always_pass() {
        for code in 200..=299 {
            assert!(StatusPolicy::validate(code, &FOLLOW).is_ok(), "{code}");
            assert!(StatusPolicy::validate(code, &NO_FOLLOW).is_ok(), "{code}");
        }
    }

    #[test]
    fn three_hundreds_pass_only_without_following() {
        for code in 300..=399 {
            let err = StatusPolicy::validate(code, &FOLLOW).unwrap_err();
            assert_eq!(err.code(), code);
            assert!(StatusPolicy::validate(code, &NO_FOLLOW).is_ok(), "{code}");
        }
    }

    #[test]
    fn everything_else_fails() {
        for code in (0..200).chain(400..=u16::MAX) {
            assert!(StatusPolicy::validate(code, &FOLLOW).is_err(), "{code}");
            assert!(StatusPolicy::validate(code, &NO_FOLLOW).is_err(), "{code}");
        }
    }

    #[test]
    fn not_found_carries_code() {
        let err = StatusPolicy::validate(404, &RequestOptions::default()).unwrap_err();
        assert_eq!(err.code(), 404);
    }
}
