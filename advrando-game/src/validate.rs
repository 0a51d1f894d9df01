use crate::{ConnectionMap, LinkType, LogicGraph, NodeIdx};
use anyhow::{ensure, Context, Result};

impl LogicGraph {
    /// Nodes reachable from the roots when every gate is open and exits follow `connections`.
    pub fn structural_reach(&self, connections: &ConnectionMap) -> Vec<bool> {
        let mut reached = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeIdx> = self.roots.clone();
        for &r in &self.roots {
            reached[r] = true;
        }
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let path_targets = node.paths.iter().map(|e| Some(e.to));
            let exit_targets = node
                .exits
                .iter()
                .map(|x| self.exit_target(connections, &x.id));
            for target in path_targets.chain(exit_targets).flatten() {
                if !reached[target] {
                    reached[target] = true;
                    stack.push(target);
                }
            }
        }
        reached
    }

    pub fn randomizable_exits(&self, link: LinkType) -> Vec<String> {
        let mut out = vec![];
        for node in &self.nodes {
            for exit in &node.exits {
                if exit.randomizable && exit.link == link {
                    out.push(exit.id.clone());
                }
            }
        }
        out
    }

    // A shuffled two-way exit's vanilla target must belong to another shuffled
    // two-way exit that leads back to it.
    fn check_two_way_partner(&self, exit_id: &str) -> Result<()> {
        let exit = self
            .exit(exit_id)
            .with_context(|| format!("Unknown exit {exit_id}"))?;
        let target = self
            .vanilla_connections
            .get(exit_id)
            .with_context(|| format!("Exit {exit_id} has no vanilla target"))?;
        let owner = *self
            .entrance_owner
            .get(target)
            .with_context(|| format!("Exit {exit_id} leads to unknown entrance {target}"))?;
        let partner = self.nodes[owner]
            .exits
            .iter()
            .find(|x| x.entrance.as_ref() == Some(target))
            .with_context(|| {
                format!("Two-way exit {exit_id} leads to {target}, which has no exit back")
            })?;
        ensure!(
            partner.link == LinkType::TwoWay && partner.randomizable,
            "Two-way exit {exit_id} pairs with {}, which is not a randomizable two-way exit",
            partner.id
        );
        ensure!(
            self.vanilla_connections.get(&partner.id) == exit.entrance.as_ref(),
            "Two-way exit {} does not lead back to {exit_id}",
            partner.id
        );
        Ok(())
    }

    /// Structural checks run after loading: full connectivity from the roots with
    /// vanilla connections, and shuffled two-way doorways that come in matching
    /// pairs.
    pub fn validate(&self) -> Result<()> {
        let reached = self.structural_reach(&self.vanilla_connections);
        let unreached: Vec<&str> = self
            .nodes
            .iter()
            .zip(reached.iter())
            .filter(|(_, r)| !**r)
            .map(|(n, _)| n.id.as_str())
            .collect();
        ensure!(
            unreached.is_empty(),
            "Graph is not connected from the roots; unreachable nodes: {}",
            unreached.join(", ")
        );

        let two_way = self.randomizable_exits(LinkType::TwoWay);
        ensure!(
            two_way.len() % 2 == 0,
            "Odd number of randomizable two-way doorways ({}): {}",
            two_way.len(),
            two_way.join(", ")
        );
        for exit_id in &two_way {
            self.check_two_way_partner(exit_id)?;
        }
        Ok(())
    }
}
