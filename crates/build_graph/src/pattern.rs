/// Match `name` against a glob with `*` (any run) and `?` (any one char).
///
/// Iterative with single-star backtracking, so patterns like `*.tex.*`
/// stay linear in practice.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
  let pattern: Vec<char> = pattern.chars().collect();
  let name: Vec<char> = name.chars().collect();

  let (mut p, mut n) = (0, 0);
  let mut star: Option<(usize, usize)> = None;

  while n < name.len() {
    match pattern.get(p) {
      Some('*') => {
        star = Some((p, n));
        p += 1;
      }
      Some(&c) if c == '?' || c == name[n] => {
        p += 1;
        n += 1;
      }
      _ => match star {
        // Let the last star swallow one more char
        Some((star_p, star_n)) => {
          p = star_p + 1;
          n = star_n + 1;
          star = Some((star_p, star_n + 1));
        }
        None => return false,
      },
    }
  }

  pattern[p..].iter().all(|&c| c == '*')
}
