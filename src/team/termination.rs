//! 终止条件：可组合的谓词树
//!
//! evaluate 是对 (Transcript, TaskLedger) 的纯函数。TextMention 只看最近一条消息（区分大小写），
//! Any / All 短路求值。可用 `|` / `&` 组合：`TerminationCondition::text_mention("exit") | TerminationCondition::MaxTurns(20)`。

use std::fmt;
use std::ops::{BitAnd, BitOr};

use crate::team::{TaskLedger, Transcript};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationCondition {
    MaxTurns(u32),
    MaxStalls(u32),
    TextMention(String),
    Any(Vec<TerminationCondition>),
    All(Vec<TerminationCondition>),
}

impl TerminationCondition {
    pub fn text_mention(token: impl Into<String>) -> Self {
        TerminationCondition::TextMention(token.into())
    }

    pub fn evaluate(&self, transcript: &Transcript, ledger: &TaskLedger) -> bool {
        match self {
            TerminationCondition::MaxTurns(n) => ledger.turn_count() >= *n,
            TerminationCondition::MaxStalls(n) => ledger.stall_count() >= *n,
            TerminationCondition::TextMention(token) => transcript
                .last()
                .is_some_and(|m| m.content.as_text().contains(token.as_str())),
            TerminationCondition::Any(children) => {
                children.iter().any(|c| c.evaluate(transcript, ledger))
            }
            TerminationCondition::All(children) => {
                children.iter().all(|c| c.evaluate(transcript, ledger))
            }
        }
    }
}

impl BitOr for TerminationCondition {
    type Output = TerminationCondition;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (TerminationCondition::Any(mut a), TerminationCondition::Any(b)) => {
                a.extend(b);
                TerminationCondition::Any(a)
            }
            (TerminationCondition::Any(mut a), other) => {
                a.push(other);
                TerminationCondition::Any(a)
            }
            (other, TerminationCondition::Any(mut b)) => {
                b.insert(0, other);
                TerminationCondition::Any(b)
            }
            (a, b) => TerminationCondition::Any(vec![a, b]),
        }
    }
}

impl BitAnd for TerminationCondition {
    type Output = TerminationCondition;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (TerminationCondition::All(mut a), TerminationCondition::All(b)) => {
                a.extend(b);
                TerminationCondition::All(a)
            }
            (TerminationCondition::All(mut a), other) => {
                a.push(other);
                TerminationCondition::All(a)
            }
            (other, TerminationCondition::All(mut b)) => {
                b.insert(0, other);
                TerminationCondition::All(b)
            }
            (a, b) => TerminationCondition::All(vec![a, b]),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[TerminationCondition],
    op: &str,
) -> fmt::Result {
    f.write_str("(")?;
    for (i, c) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", c)?;
    }
    f.write_str(")")
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCondition::MaxTurns(n) => write!(f, "MaxTurns({})", n),
            TerminationCondition::MaxStalls(n) => write!(f, "MaxStalls({})", n),
            TerminationCondition::TextMention(t) => write!(f, "TextMention({:?})", t),
            TerminationCondition::Any(children) => write_joined(f, children, "OR"),
            TerminationCondition::All(children) => write_joined(f, children, "AND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::MessageContent;

    fn transcript_of(texts: &[&str]) -> Transcript {
        let mut t = Transcript::new();
        for text in texts {
            t.append("agent", MessageContent::text(*text), false);
        }
        t
    }

    #[test]
    fn test_text_mention_only_checks_last_message() {
        let cond = TerminationCondition::text_mention("exit");
        let ledger = TaskLedger::new("task");
        assert!(cond.evaluate(&transcript_of(&["hello", "exit"]), &ledger));
        assert!(!cond.evaluate(&transcript_of(&["exit", "still going"]), &ledger));
        assert!(!cond.evaluate(&Transcript::new(), &ledger));
    }

    #[test]
    fn test_text_mention_is_case_sensitive() {
        let cond = TerminationCondition::text_mention("APPROVE");
        let ledger = TaskLedger::new("task");
        assert!(!cond.evaluate(&transcript_of(&["approve"]), &ledger));
        assert!(cond.evaluate(&transcript_of(&["I APPROVE this"]), &ledger));
    }

    #[test]
    fn test_counters() {
        let mut ledger = TaskLedger::new("task");
        let t = Transcript::new();
        ledger.record_turn(false);
        ledger.record_turn(false);
        assert!(TerminationCondition::MaxTurns(2).evaluate(&t, &ledger));
        assert!(!TerminationCondition::MaxTurns(3).evaluate(&t, &ledger));
        assert!(TerminationCondition::MaxStalls(2).evaluate(&t, &ledger));
        assert!(!TerminationCondition::MaxStalls(2).evaluate(&t, &ledger.without_stalls()));
    }

    #[test]
    fn test_composites_and_operators() {
        let ledger = TaskLedger::new("task");
        let t = transcript_of(&["exit"]);
        let any = TerminationCondition::MaxTurns(5) | TerminationCondition::text_mention("exit");
        assert!(any.evaluate(&t, &ledger));
        let all = TerminationCondition::MaxTurns(5) & TerminationCondition::text_mention("exit");
        assert!(!all.evaluate(&t, &ledger));
        assert!(!TerminationCondition::Any(vec![]).evaluate(&t, &ledger));
        assert!(TerminationCondition::All(vec![]).evaluate(&t, &ledger));

        let flat = any | TerminationCondition::MaxStalls(3);
        match &flat {
            TerminationCondition::Any(children) => assert_eq!(children.len(), 3),
            other => panic!("expected Any, got {other}"),
        }
        assert_eq!(
            flat.to_string(),
            "(MaxTurns(5) OR TextMention(\"exit\") OR MaxStalls(3))"
        );
    }
}
