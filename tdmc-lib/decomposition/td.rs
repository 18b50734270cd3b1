//! Parser for tree decompositions in the PACE 2017 `.td` format.
use anyhow::{bail, Context, Result};

use crate::decomposition::TreeDecomposition;

/// Solution line of a `.td` file: `s td <bags> <width+1> <vars>`.
#[derive(Debug, PartialEq, Eq)]
pub struct TdHeader {
    pub num_bags: usize,
    pub max_bag_size: usize,
    pub num_vars: u64,
}

fn parse_header(line: &str) -> Result<TdHeader> {
    let fields: Vec<_> = line.split_whitespace().collect();
    if fields.len() != 5 || fields[0] != "s" || fields[1] != "td" {
        bail!("solution line must read 's td <bags> <width+1> <vars>', found '{line}'");
    }
    Ok(TdHeader {
        num_bags: fields[2]
            .parse()
            .context("could not parse the number of bags")?,
        max_bag_size: fields[3]
            .parse()
            .context("could not parse the maximum bag size")?,
        num_vars: fields[4]
            .parse()
            .context("could not parse the number of variables")?,
    })
}

/// Parse a complete `.td` file into a rooted [`TreeDecomposition`].
///
/// # Errors
///
/// Returns an error when the solution line is missing or malformed, a bag id
/// or variable is out of range, a bag is declared twice, or the edges do not
/// form a tree over the declared bags.
pub fn parse(reader: &mut dyn std::io::Read) -> Result<TreeDecomposition> {
    let mut buffered = std::io::BufReader::new(reader);
    let mut contents = String::new();
    std::io::Read::read_to_string(&mut buffered, &mut contents)
        .context("could not read decomposition")?;

    let mut header: Option<TdHeader> = None;
    let mut bag_variables: Vec<Option<Vec<u64>>> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('c') {
            continue;
        }

        if trimmed.starts_with('s') {
            if header.is_some() {
                bail!("duplicate solution line");
            }
            let parsed = parse_header(trimmed)?;
            bag_variables = vec![None; parsed.num_bags];
            header = Some(parsed);
            continue;
        }

        let Some(header) = header.as_ref() else {
            bail!("found '{trimmed}' before the solution line");
        };

        if let Some(rest) = trimmed.strip_prefix('b') {
            let mut fields = rest.split_whitespace();
            let id: usize = fields
                .next()
                .context("bag line is missing its id")?
                .parse()
                .context("could not parse bag id")?;
            if id == 0 || id > header.num_bags {
                bail!("bag id {id} outside [1, {}]", header.num_bags);
            }
            if bag_variables[id - 1].is_some() {
                bail!("bag {id} declared twice");
            }

            let mut variables = Vec::new();
            for field in fields {
                let var: u64 = field
                    .parse()
                    .with_context(|| format!("could not parse variable '{field}' of bag {id}"))?;
                if var == 0 || var > header.num_vars {
                    bail!("variable {var} of bag {id} outside [1, {}]", header.num_vars);
                }
                variables.push(var);
            }
            bag_variables[id - 1] = Some(variables);
        } else {
            let fields: Vec<_> = trimmed.split_whitespace().collect();
            if fields.len() != 2 {
                bail!("edge line must contain exactly two bag ids, found '{trimmed}'");
            }
            let from: usize = fields[0].parse().context("could not parse edge endpoint")?;
            let to: usize = fields[1].parse().context("could not parse edge endpoint")?;
            edges.push((from, to));
        }
    }

    let header = header.context("decomposition is missing the solution line")?;
    let bag_variables = bag_variables
        .into_iter()
        .map(|bag| bag.unwrap_or_default())
        .collect();

    TreeDecomposition::from_adjacency(bag_variables, &edges, header.num_vars)
}
