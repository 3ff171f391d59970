use crate::models::frame::Frame;
use crate::models::result::ProtocolNode;

/// Arena slot: counters plus child indices in first-seen order
#[derive(Debug, Default)]
struct Slot {
    protocol: String,
    frames: u64,
    bytes: u64,
    children: Vec<usize>,
}

/// Accumulates per-layer frame and byte counts
///
/// Nodes are keyed by exact protocol name under their parent path. Memory
/// grows with the number of distinct paths, not with the number of frames.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    slots: Vec<Slot>,
    roots: Vec<usize>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame along its layer stack
    pub fn add(&mut self, frame: &Frame) {
        let bytes = frame.length as u64;
        let mut parent: Option<usize> = None;

        for layer in &frame.layers {
            let idx = self.find_or_create(parent, layer);
            let slot = &mut self.slots[idx];
            slot.frames += 1;
            slot.bytes += bytes;
            parent = Some(idx);
        }
    }

    fn find_or_create(&mut self, parent: Option<usize>, protocol: &str) -> usize {
        let siblings = match parent {
            Some(p) => &self.slots[p].children,
            None => &self.roots,
        };

        if let Some(&idx) = siblings.iter().find(|&&idx| self.slots[idx].protocol == protocol) {
            return idx;
        }

        let idx = self.slots.len();
        self.slots.push(Slot {
            protocol: protocol.to_string(),
            ..Slot::default()
        });
        match parent {
            Some(p) => self.slots[p].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    /// Convert the arena into the nested output forest
    pub fn finish(self) -> Vec<ProtocolNode> {
        self.roots.iter().map(|&idx| self.node(idx)).collect()
    }

    fn node(&self, idx: usize) -> ProtocolNode {
        let slot = &self.slots[idx];
        ProtocolNode {
            protocol: slot.protocol.clone(),
            frames: slot.frames,
            bytes: slot.bytes,
            children: slot.children.iter().map(|&child| self.node(child)).collect(),
        }
    }
}

/// Build the protocol hierarchy in one pass over the frames
pub fn build_hierarchy<'a, I>(frames: I) -> Vec<ProtocolNode>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut builder = HierarchyBuilder::new();
    for frame in frames {
        builder.add(frame);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(length: usize, layers: &[&str]) -> Frame {
        let mut frame = Frame::new(1, None, length);
        frame.layers = layers.iter().map(|l| l.to_string()).collect();
        frame
    }

    #[test]
    fn test_nested_counts() {
        let frames = vec![
            frame(100, &["Ethernet", "IPv4", "TCP", "HTTP"]),
            frame(60, &["Ethernet", "IPv4", "TCP"]),
            frame(80, &["Ethernet", "IPv4", "UDP", "DNS"]),
            frame(42, &["Ethernet", "ARP"]),
        ];
        let forest = build_hierarchy(&frames);

        assert_eq!(forest.len(), 1);
        let eth = &forest[0];
        assert_eq!((eth.frames, eth.bytes), (4, 282));
        assert_eq!(eth.children.iter().map(|c| c.protocol.as_str()).collect::<Vec<_>>(), vec!["IPv4", "ARP"]);

        let ipv4 = &eth.children[0];
        assert_eq!(ipv4.frames, 3);
        let tcp = &ipv4.children[0];
        assert_eq!((tcp.frames, tcp.bytes), (2, 160));
        assert_eq!(tcp.children[0].protocol, "HTTP");
        assert_eq!(tcp.children[0].frames, 1);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let frames = vec![frame(10, &["Ethernet", "ipv4"]), frame(10, &["Ethernet", "IPv4"])];
        let forest = build_hierarchy(&frames);
        assert_eq!(forest[0].children.len(), 2);
    }

    #[test]
    fn test_root_sum_matches_frame_count() {
        let frames = vec![
            frame(10, &["Ethernet", "IPv4"]),
            frame(10, &["Loopback", "IPv6"]),
            frame(10, &["Ethernet"]),
        ];
        let forest = build_hierarchy(&frames);
        let total: u64 = forest.iter().map(|n| n.frames).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_child_never_exceeds_parent() {
        fn check(node: &ProtocolNode) {
            for child in &node.children {
                assert!(child.frames <= node.frames);
                assert!(child.bytes <= node.bytes);
                check(child);
            }
        }

        let frames = vec![
            frame(70, &["Ethernet", "IPv4", "TCP", "TLS"]),
            frame(90, &["Ethernet", "IPv4", "TCP", "TLS"]),
            frame(50, &["Ethernet", "IPv6", "UDP"]),
        ];
        build_hierarchy(&frames).iter().for_each(check);
    }
}
