//! Property-based tests for SMTP command parsing and recipient policy.

use mailgate_smtp::{PolicyFilter, command::Command};
use proptest::prelude::*;

/// Strategy to generate valid domain names
fn domain_strategy() -> impl Strategy<Value = String> {
    #[allow(
        clippy::expect_used,
        reason = "compile-time constant regex should be valid"
    )]
    prop::string::string_regex("[a-z]{3,10}\\.[a-z]{2,5}").expect("domain regex should be valid")
}

/// Strategy to generate dot-separated local parts
fn email_local_strategy() -> impl Strategy<Value = String> {
    #[allow(
        clippy::expect_used,
        reason = "compile-time constant regex should be valid"
    )]
    let atom_regex =
        prop::string::string_regex("[a-z0-9+_-]{1,10}").expect("atom regex should be valid");

    prop::collection::vec(atom_regex, 1..=3).prop_map(|atoms| atoms.join("."))
}

fn email_strategy() -> impl Strategy<Value = String> {
    (email_local_strategy(), domain_strategy())
        .prop_map(|(local, domain)| format!("{local}@{domain}"))
}

/// Parameterless commands that the session understands
fn simple_command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("QUIT".to_string()),
        Just("DATA".to_string()),
        Just("STARTTLS".to_string()),
    ]
}

/// Flip the case of every other character
fn mixed_case(cmd: &str) -> String {
    cmd.chars()
        .enumerate()
        .map(|(i, c)| {
            if i % 2 == 0 {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            }
        })
        .collect()
}

proptest! {
    /// MAIL FROM captures exactly the bracketed address
    #[test]
    fn test_mail_from_captures_address(email in email_strategy()) {
        let parsed = Command::from(format!("MAIL FROM:<{email}>").as_str());
        prop_assert_eq!(parsed, Command::MailFrom(email));
    }

    /// RCPT TO captures exactly the bracketed address
    #[test]
    fn test_rcpt_to_captures_address(email in email_strategy()) {
        let parsed = Command::from(format!("RCPT TO:<{email}>").as_str());
        prop_assert_eq!(parsed, Command::RcptTo(email));
    }

    /// Command keywords are case-insensitive
    #[test]
    fn test_case_insensitive_parsing(cmd in simple_command_strategy()) {
        let upper = Command::from(cmd.to_uppercase().as_str());
        let lower = Command::from(cmd.to_lowercase().as_str());
        let mixed = Command::from(mixed_case(&cmd).as_str());

        prop_assert!(!matches!(upper, Command::Invalid(_)));
        prop_assert_eq!(&upper, &lower);
        prop_assert_eq!(&upper, &mixed);
    }

    /// HELO and EHLO keep their argument whatever the keyword case
    #[test]
    fn test_hello_arguments(domain in domain_strategy(), ehlo in any::<bool>()) {
        let keyword = if ehlo { "eHlO" } else { "hElO" };
        let parsed = Command::from(format!("   {keyword} {domain}  ").as_str());

        let expected = if ehlo {
            Command::Ehlo(domain)
        } else {
            Command::Helo(domain)
        };
        prop_assert_eq!(parsed, expected);
    }

    /// Parsing never panics on arbitrary input
    #[test]
    fn test_arbitrary_input_does_not_panic(s in "\\PC*") {
        let _ = Command::from(s.as_str());
    }

    /// Displaying a parsed envelope command gives back the same command
    #[test]
    fn test_envelope_roundtrip(email in email_strategy(), rcpt in any::<bool>()) {
        let command = if rcpt {
            Command::RcptTo(email)
        } else {
            Command::MailFrom(email)
        };

        prop_assert_eq!(Command::from(command.to_string().as_str()), command);
    }

    /// A block-listed domain blocks every address under it, and nothing else
    #[test]
    fn test_blocked_domain_matches_addresses(
        local in email_local_strategy(),
        blocked in domain_strategy(),
        other in domain_strategy(),
    ) {
        prop_assume!(!other.contains(blocked.as_str()));

        let filter = PolicyFilter::new(&[blocked.as_str()], &[]);
        let target = format!("{local}@{blocked}");
        let bystander = format!("{local}@{other}");
        let local_matches = local.contains(blocked.as_str());

        prop_assert!(filter.is_blocked(&target));
        prop_assert!(!filter.is_blocked(&bystander) || local_matches);
    }
}
