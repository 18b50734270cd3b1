//! DIMACS module responsible for parsing CNF problem files, including the
//! `w <lit> <weight>` extension used by weighted model counting inputs.
use std::collections::VecDeque;

use anyhow::{bail, Context, Result};

use crate::formula::{Literal, SatFormula};

/// Preamble of the DIMACS file.
#[derive(Debug, PartialEq, Eq)]
pub struct Preamble {
    pub clauses: usize,
    pub variables: u64,
}

/// One parsed element of the clause section.
#[derive(Debug, PartialEq)]
pub enum DimacsItem {
    /// Disjunction of literals, terminated by `0` in the input.
    Clause(Vec<Literal>),
    /// `w <lit> <weight>` line assigning a per-literal weight.
    Weight(Literal, f64),
}

/// Current state of the DIMACS parser.
#[derive(PartialEq, Eq)]
enum DimacsParserState {
    Initialized,
    PreambleParsed,
    ParsingClauses,
    Finished,
}

/// Streaming DIMACS parser. Clauses may span multiple lines; comment lines
/// are skipped wherever they occur.
#[allow(clippy::module_name_repetitions)]
pub struct DimacsParser<'a> {
    reader: &'a mut dyn std::io::BufRead,
    state: DimacsParserState,
    tokens: VecDeque<String>,
}

impl<'a> DimacsParser<'a> {
    #[must_use]
    pub fn new(reader: &'a mut dyn std::io::BufRead) -> Self {
        DimacsParser {
            reader,
            state: DimacsParserState::Initialized,
            tokens: VecDeque::new(),
        }
    }

    /// Parse the preamble: any number of comments followed by the problem
    /// line `p cnf <variables> <clauses>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the preamble has already been parsed, the problem
    /// line is missing, or its fields are malformed.
    pub fn parse_preamble(&mut self) -> Result<Preamble> {
        if self.state != DimacsParserState::Initialized {
            bail!("preamble already parsed");
        }

        match self.next_token()? {
            Some(p) if p == "p" => {}
            Some(other) => bail!("first field of problem line must be 'p', found '{other}'"),
            None => bail!("preamble is missing a problem line"),
        }
        match self.next_token()? {
            Some(cnf) if cnf == "cnf" => {}
            Some(other) => bail!("second field of problem line must be 'cnf', found '{other}'"),
            None => bail!("problem line ends after 'p'"),
        }

        let variables = self
            .next_token()?
            .context("problem line is missing the variable count")?
            .parse::<u64>()
            .context("could not parse number of variables")?;
        let clauses = self
            .next_token()?
            .context("problem line is missing the clause count")?
            .parse::<usize>()
            .context("could not parse number of clauses")?;

        self.state = DimacsParserState::PreambleParsed;
        Ok(Preamble { clauses, variables })
    }

    /// Parse the next clause or weight line. Returns `None` once the input
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error on non-numeric literals or truncated weight lines.
    pub fn parse_next_item(&mut self) -> Result<Option<DimacsItem>> {
        assert!(self.state != DimacsParserState::Initialized);

        if self.state == DimacsParserState::Finished {
            return Ok(None);
        }
        self.state = DimacsParserState::ParsingClauses;

        let Some(first) = self.next_token()? else {
            self.state = DimacsParserState::Finished;
            return Ok(None);
        };

        if first == "w" {
            return self.parse_weight().map(Some);
        }

        let mut literals = Vec::new();
        let mut token = first;
        loop {
            let lit = token
                .parse::<i64>()
                .with_context(|| format!("literal '{token}' is invalid"))?;
            if lit == 0 {
                break;
            }
            literals.push(Literal(lit));

            match self.next_token()? {
                Some(next) => token = next,
                // A final clause without the terminating 0 is accepted.
                None => {
                    self.state = DimacsParserState::Finished;
                    break;
                }
            }
        }

        Ok(Some(DimacsItem::Clause(literals)))
    }

    fn parse_weight(&mut self) -> Result<DimacsItem> {
        let lit = self
            .next_token()?
            .context("weight line is missing its literal")?
            .parse::<i64>()
            .context("could not parse weight literal")?;
        if lit == 0 {
            bail!("weight line literal must be non-zero");
        }
        let weight = self
            .next_token()?
            .context("weight line is missing its value")?
            .parse::<f64>()
            .context("could not parse weight value")?;

        // Tolerate an optional terminating 0.
        if matches!(self.peek_token()?, Some("0")) {
            let _ = self.next_token()?;
        }

        Ok(DimacsItem::Weight(Literal(lit), weight))
    }

    fn next_token(&mut self) -> Result<Option<String>> {
        self.fill_tokens()?;
        Ok(self.tokens.pop_front())
    }

    fn peek_token(&mut self) -> Result<Option<&str>> {
        self.fill_tokens()?;
        Ok(self.tokens.front().map(String::as_str))
    }

    fn fill_tokens(&mut self) -> Result<()> {
        while self.tokens.is_empty() {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .context("could not read DIMACS line")?;
            if read == 0 {
                return Ok(());
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('c') || trimmed.starts_with('%') {
                continue;
            }
            self.tokens
                .extend(trimmed.split_whitespace().map(str::to_owned));
        }
        Ok(())
    }
}

/// Parse a complete DIMACS CNF into a [`SatFormula`].
///
/// # Errors
///
/// Returns an error on a malformed preamble, non-numeric tokens, or a
/// literal whose variable lies outside `[1, variables]`.
pub fn parse(reader: &mut dyn std::io::Read) -> Result<SatFormula> {
    let mut buffered = std::io::BufReader::new(reader);
    let mut parser = DimacsParser::new(&mut buffered);
    let preamble = parser.parse_preamble()?;

    let mut literals = Vec::new();
    let mut clause_lens = Vec::with_capacity(preamble.clauses);
    let mut weights: Option<Vec<f64>> = None;

    while let Some(item) = parser.parse_next_item()? {
        match item {
            DimacsItem::Clause(clause) => {
                for lit in &clause {
                    if lit.variable() > preamble.variables {
                        bail!(
                            "literal {lit} outside the declared {} variables",
                            preamble.variables
                        );
                    }
                }
                clause_lens.push(clause.len());
                literals.extend(clause);
            }
            DimacsItem::Weight(lit, weight) => {
                if lit.variable() > preamble.variables {
                    bail!(
                        "weight literal {lit} outside the declared {} variables",
                        preamble.variables
                    );
                }
                let table = weights
                    .get_or_insert_with(|| vec![1.0; 2 * (preamble.variables as usize + 1)]);
                let slot = 2 * lit.variable() as usize + usize::from(lit.0 < 0);
                table[slot] = weight;
            }
        }
    }

    if clause_lens.len() != preamble.clauses {
        tracing::warn!(
            declared = preamble.clauses,
            parsed = clause_lens.len(),
            "clause count differs from the preamble"
        );
    }

    Ok(SatFormula::from_flat(
        preamble.variables,
        literals,
        clause_lens,
        weights,
    ))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use std::io::BufReader;

    use super::{parse, DimacsItem, DimacsParser, Preamble};
    use crate::formula::Literal;

    #[test]
    fn dimacs_ok() {
        let contents = "c Example CNF format file
c
p cnf 4 3
1 3 -4 0
4 0 2
-3";
        let mut reader = BufReader::new(contents.as_bytes());
        let mut parser = DimacsParser::new(&mut reader);

        assert_eq!(
            parser.parse_preamble().unwrap(),
            Preamble {
                variables: 4,
                clauses: 3
            }
        );

        let mut clauses = Vec::new();
        while let Some(item) = parser.parse_next_item().unwrap() {
            clauses.push(item);
        }

        assert_eq!(
            clauses,
            vec![
                DimacsItem::Clause(vec![Literal(1), Literal(3), Literal(-4)]),
                DimacsItem::Clause(vec![Literal(4)]),
                DimacsItem::Clause(vec![Literal(2), Literal(-3)]),
            ]
        );
    }

    #[test]
    fn dimacs_weights() {
        let contents = "p cnf 2 1
c weights may appear between clauses
w 1 0.3
w -1 0.7 0
1 2 0";
        let formula = parse(&mut contents.as_bytes()).unwrap();
        assert!(formula.is_weighted());
        assert_eq!(formula.weight(Literal(1)), 0.3);
        assert_eq!(formula.weight(Literal(-1)), 0.7);
        assert_eq!(formula.weight(Literal(2)), 1.0);
        assert_eq!(formula.num_clauses(), 1);
    }

    #[test]
    fn dimacs_rejects_missing_problem_line() {
        let contents = "c just a comment\n1 2 0";
        assert!(parse(&mut contents.as_bytes()).is_err());
    }

    #[test]
    fn dimacs_rejects_out_of_range_literal() {
        let contents = "p cnf 2 1\n1 5 0";
        assert!(parse(&mut contents.as_bytes()).is_err());
    }

    #[test]
    fn dimacs_rejects_garbage_literal() {
        let contents = "p cnf 2 1\n1 x 0";
        assert!(parse(&mut contents.as_bytes()).is_err());
    }
}
