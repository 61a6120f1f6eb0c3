/// Counters from a harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub queries_run: u32,
    pub queries_skipped: u32,
    pub links_discovered: u32,
    pub threads_collected: u32,
    pub threads_empty: u32,
    pub posts_seen: u32,
    pub matches: u32,
    pub checkpoints_written: u32,
    pub checkpoints_failed: u32,
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        writeln!(f, "Queries run:        {}", self.queries_run)?;
        writeln!(f, "Queries skipped:    {}", self.queries_skipped)?;
        writeln!(f, "Links discovered:   {}", self.links_discovered)?;
        writeln!(f, "Threads collected:  {}", self.threads_collected)?;
        writeln!(f, "Threads empty:      {}", self.threads_empty)?;
        writeln!(f, "Posts seen:         {}", self.posts_seen)?;
        writeln!(f, "Matches:            {}", self.matches)?;
        if self.checkpoints_written + self.checkpoints_failed > 0 {
            writeln!(f, "\nCheckpoints:")?;
            writeln!(f, "  Written: {}", self.checkpoints_written)?;
            if self.checkpoints_failed > 0 {
                writeln!(f, "  Failed:  {}", self.checkpoints_failed)?;
            }
        }
        let threads = (self.threads_collected + self.threads_empty).max(1);
        writeln!(
            f,
            "\nMatches per thread: {:.2}",
            self.matches as f64 / threads as f64
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_hides_checkpoint_section_when_unused() {
        let shown = HarvestStats::default().to_string();
        assert!(shown.contains("Queries run:        0"));
        assert!(!shown.contains("Checkpoints:"));
    }

    #[test]
    fn display_reports_failed_checkpoints() {
        let stats = HarvestStats {
            threads_collected: 4,
            matches: 2,
            checkpoints_written: 1,
            checkpoints_failed: 1,
            ..HarvestStats::default()
        };
        let shown = stats.to_string();
        assert!(shown.contains("Failed:  1"));
        assert!(shown.contains("Matches per thread: 0.50"));
    }
}
