use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::grammar::{Grammar, Production, Rule};

/// A rule with a dot: how many of its productions have been matched so far
#[derive(Debug, Clone, PartialEq)]
pub struct LR0 {
  pub rule: Rc<Rule>,
  pub pos: usize,
}

impl LR0 {
  pub fn new(rule: &Rc<Rule>) -> Self {
    Self { rule: rule.clone(), pos: 0 }
  }

  pub fn is_active(&self) -> bool {
    self.pos < self.rule.len()
  }

  pub fn advance(&self) -> Self {
    debug_assert!(self.is_active());
    Self {
      rule: self.rule.clone(),
      pos: self.pos + 1,
    }
  }

  pub fn next_production(&self) -> Option<&Production> {
    self.rule.productions.get(self.pos)
  }
}

impl fmt::Display for LR0 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} →", self.rule.symbol)?;
    for idx in 0..self.rule.len() {
      if idx == self.pos {
        write!(f, " ・")?;
      }
      write!(f, " {}", self.rule.productions[idx])?;
    }
    if !self.is_active() {
      write!(f, " ・")?;
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
  pub lr0: LR0,
  pub origin: usize,
}

impl State {
  pub fn new(lr0: LR0, origin: usize) -> Self {
    Self { lr0, origin }
  }

  pub fn advance(&self) -> Self {
    Self::new(self.lr0.advance(), self.origin)
  }

  fn key(&self) -> (usize, usize, usize) {
    (self.lr0.rule.id, self.lr0.pos, self.origin)
  }
}

#[derive(Debug)]
pub struct Chart {
  columns: Vec<Vec<State>>,
  seen: Vec<HashSet<(usize, usize, usize)>>,
}

impl Chart {
  pub fn new(length: usize) -> Self {
    Self {
      columns: vec![Vec::new(); length],
      seen: vec![HashSet::new(); length],
    }
  }

  pub fn len(&self) -> usize {
    self.columns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn len_at(&self, k: usize) -> usize {
    self.columns[k].len()
  }

  pub fn has(&self, k: usize, state: &State) -> bool {
    self.seen[k].contains(&state.key())
  }

  pub fn add(&mut self, k: usize, state: State) {
    if self.seen[k].insert(state.key()) {
      self.columns[k].push(state);
    }
  }

  /// Whether a rule for `symbol` spans the whole input
  pub fn is_complete(&self, symbol: &str) -> bool {
    self.columns.last().is_some_and(|last| {
      last
        .iter()
        .any(|s| s.origin == 0 && !s.lr0.is_active() && s.lr0.rule.symbol == symbol)
    })
  }

  /// Owned copy of a state, so the chart can be borrowed mutably afterwards.
  /// Only an Rc and two usizes.
  fn get_state(&self, k: usize, idx: usize) -> State {
    self.columns[k][idx].clone()
  }
}

impl IntoIterator for Chart {
  type Item = (usize, Vec<State>);
  type IntoIter = std::iter::Enumerate<std::vec::IntoIter<Vec<State>>>;

  fn into_iter(self) -> Self::IntoIter {
    self.columns.into_iter().enumerate()
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for k in 0..self.len() {
      writeln!(f, "State {}:", k)?;
      for state in self.columns[k].iter() {
        writeln!(f, "  {}..{}: {}", state.origin, k, state.lr0)?;
      }
    }
    Ok(())
  }
}

pub fn parse_chart(g: &Grammar, input: &[&str]) -> Chart {
  let mut chart = Chart::new(input.len() + 1);

  let Some(start_rules) = g.rules.get(&g.start) else {
    return chart;
  };
  for rule in start_rules {
    chart.add(0, State::new(LR0::new(rule), 0));
  }

  for k in 0..chart.len() {
    // the number of states at k grows while we walk it
    let mut idx = 0;
    while idx < chart.len_at(k) {
      let state = chart.get_state(k, idx);
      idx += 1;

      match state.lr0.next_production() {
        None => completer(&mut chart, k, &state),
        Some(Production::Nonterminal(symbol)) => predictor(g, &mut chart, k, &state, symbol),
        Some(Production::Terminal(word)) => scanner(&mut chart, k, &state, word, input),
      };
    }
  }

  chart
}

fn completer(chart: &mut Chart, k: usize, state: &State) {
  // advance every state at the origin that was waiting on this symbol
  for idx in 0..chart.len_at(state.origin) {
    let other = chart.get_state(state.origin, idx);

    if let Some(Production::Nonterminal(symbol)) = other.lr0.next_production() {
      if *symbol == state.lr0.rule.symbol {
        chart.add(k, other.advance())
      }
    }
  }
}

fn predictor(g: &Grammar, chart: &mut Chart, k: usize, state: &State, needed_symbol: &str) {
  let Some(wanted_rules) = g.rules.get(needed_symbol) else {
    return;
  };
  for wanted_rule in wanted_rules {
    chart.add(k, State::new(LR0::new(wanted_rule), k));
  }

  // completer won't revisit this state for an empty match at k, so step
  // over nullable symbols here
  if g.is_nullable(needed_symbol) {
    chart.add(k, state.advance());
  }
}

fn scanner(chart: &mut Chart, k: usize, state: &State, word: &str, input: &[&str]) {
  if input.get(k) == Some(&word) {
    chart.add(k + 1, state.advance());
  }
}
