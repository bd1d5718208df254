//! Built-in detection rules.

use super::rules::{Atom, Condition, YaraRule};

const URL_PREFIX: &str = r"https?://[^\s/$.?#].[^\s]*";

/// The shipped rule corpus, in evaluation order.
pub fn default_rules() -> Vec<YaraRule> {
    vec![
        suspicious_executable(),
        suspicious_script_content(),
        ransomware_patterns(),
        malicious_urls(),
        suspicious_powershell(),
        potential_backdoor(),
    ]
}

fn suspicious_executable() -> YaraRule {
    YaraRule::new("suspicious_executable")
        .with_description("Executable or script header at the start of the file")
        .with_category("executable")
        .with_string(Atom::hex("$mz_header", "4D 5A").at(0))
        .with_string(Atom::hex("$elf_header", "7F 45 4C 46").at(0))
        .with_string(Atom::hex("$script_header", "23 21").at(0))
        .with_string(Atom::hex("$pdf_header", "25 50 44 46").at(0))
        .with_condition(Condition::Or(vec![
            Condition::atom("$mz_header"),
            Condition::atom("$elf_header"),
            Condition::atom("$script_header"),
            Condition::atom("$pdf_header"),
        ]))
}

fn suspicious_script_content() -> YaraRule {
    let nocase = [
        ("$shell2", "exec("),
        ("$shell3", "system("),
        ("$shell4", "popen("),
        ("$exec1", "eval("),
        ("$exec2", "execute("),
        ("$exec3", "assert("),
        ("$file2", "fopen("),
        ("$file3", "readfile("),
        ("$net1", "curl_exec("),
        ("$net2", "fsockopen("),
        ("$net3", "socket("),
        ("$enc1", "base64_decode("),
        ("$enc2", "str_rot13("),
        ("$enc3", "gzinflate("),
        ("$enc4", "gzuncompress("),
    ];

    let mut rule = YaraRule::new("suspicious_script_content")
        .with_description("Script calling into shell, eval, file, network or decoding APIs")
        .with_category("script")
        .with_string(Atom::text("$shell1", "shell_exec").fullword())
        .with_string(Atom::text("$file1", "file_get_contents").fullword());
    for (id, pattern) in nocase {
        rule = rule.with_string(Atom::text(id, pattern).nocase());
    }
    rule.with_condition(Condition::at_least_of_them(3))
}

fn ransomware_patterns() -> YaraRule {
    let words = [
        ("$ransom1", "Your files have been encrypted"),
        ("$ransom2", "bitcoin"),
        ("$ransom3", "decrypt"),
        ("$ransom4", "payment"),
        ("$ransom5", "wallet"),
    ];

    words
        .into_iter()
        .fold(
            YaraRule::new("ransomware_patterns")
                .with_description("Ransom note vocabulary")
                .with_category("ransomware"),
            |rule, (id, word)| rule.with_string(Atom::text(id, word).nocase().wide().ascii()),
        )
        .with_condition(Condition::at_least_of_them(3))
}

fn malicious_urls() -> YaraRule {
    YaraRule::new("malicious_urls")
        .with_description("Hidden-service or high-risk TLD URLs and wallet addresses")
        .with_category("network")
        .with_string(Atom::regex("$url1", &format!(r"{}\.onion\b", URL_PREFIX)).wide().ascii())
        .with_string(Atom::regex("$url2", &format!(r"{}\.ru\b", URL_PREFIX)).wide().ascii())
        .with_string(Atom::regex("$url3", &format!(r"{}\.cn\b", URL_PREFIX)).wide().ascii())
        .with_string(
            Atom::regex("$url4", "(bitcoin|monero|ethereum)[a-zA-Z0-9]{25,45}")
                .wide()
                .ascii(),
        )
        .with_condition(Condition::any_of_them())
}

fn suspicious_powershell() -> YaraRule {
    let flags = [
        ("$enc_cmd", "-enc"),
        ("$hidden", "-w hidden"),
        ("$noninteractive", "-noninteractive"),
        ("$bypass", "bypass"),
        ("$downloadstring", "downloadstring"),
        ("$webclient", "net.webclient"),
        ("$invoke_expression", "iex"),
    ];

    flags
        .into_iter()
        .fold(
            YaraRule::new("suspicious_powershell")
                .with_description("PowerShell launched hidden, encoded or downloading code")
                .with_category("powershell"),
            |rule, (id, flag)| rule.with_string(Atom::text(id, flag).nocase()),
        )
        .with_condition(Condition::at_least_of_them(3))
}

fn potential_backdoor() -> YaraRule {
    YaraRule::new("potential_backdoor")
        .with_description("Server-side page with command, shell, upload or connect-back hooks")
        .with_category("webshell")
        .with_string(Atom::text("$php_shell", "<?php").nocase())
        .with_string(Atom::text("$asp_shell", "<%@ Page").nocase())
        .with_string(Atom::text("$jsp_shell", "<%@ page").nocase())
        .with_string(Atom::text("$cmd_exec", "cmd").nocase())
        .with_string(Atom::text("$remote_shell", "shell").nocase())
        .with_string(Atom::text("$upload_func", "upload").nocase())
        .with_string(Atom::text("$connect_back", "connect").nocase())
        .with_condition(Condition::And(vec![
            Condition::Or(vec![
                Condition::atom("$php_shell"),
                Condition::atom("$asp_shell"),
                Condition::atom("$jsp_shell"),
            ]),
            Condition::at_least(
                2,
                &["$cmd_exec", "$remote_shell", "$upload_func", "$connect_back"],
            ),
        ]))
}
