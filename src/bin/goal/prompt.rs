use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

use webgoal::goal::{GoalPrompt, Operator, OperatorAnswer};

/// Asks the person at the terminal what to do next.
pub struct TerminalOperator {
    lines: Lines<BufReader<Stdin>>,
    stdout: Stdout,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stdout: tokio::io::stdout(),
        }
    }

    async fn question(&mut self, text: &str) -> std::io::Result<String> {
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.write_all(b" ").await?;
        self.stdout.flush().await?;
        // EOF reads as an empty answer.
        Ok(self.lines.next_line().await?.unwrap_or_default().trim().to_string())
    }

    async fn replacement(&mut self) -> std::io::Result<OperatorAnswer> {
        let goal = self.question("New goal:").await?;
        let success_criteria = self.question("Success criteria:").await?;
        Ok(OperatorAnswer::Replace {
            goal,
            success_criteria,
        })
    }
}

#[async_trait]
impl Operator for TerminalOperator {
    async fn ask(&mut self, prompt: GoalPrompt) -> std::io::Result<OperatorAnswer> {
        match prompt {
            GoalPrompt::NewGoal => match self.question("New goal? (y/n)").await?.as_str() {
                "y" => self.replacement().await,
                _ => Ok(OperatorAnswer::Quit),
            },
            GoalPrompt::AdjustGoal => match self.question("Adjust goal? (y/n/q)").await?.as_str() {
                "y" => self.replacement().await,
                "q" => Ok(OperatorAnswer::Quit),
                _ => Ok(OperatorAnswer::Keep),
            },
        }
    }
}
