//! Participant-facing introduction texts, shown on the display window before
//! each task starts.

pub const EI_VISUALIZATION: &str = "\
Welcome to the E/I Ratio Visualization Task!

In this task, you will see a circle on the screen.
The size of this circle will change based on real-time brain activity,
representing the ratio of excitatory to inhibitory neural signals.

Your objective is to observe the changes.
There are no specific actions required from you other than to remain still and watch the display.
The task will run for a pre-determined duration or until you quit the visualization window.";

pub const M1_TASK: &str = "\
Welcome to the M1 Tapping Task!

This task is designed to measure motor cortex activity.
You will be presented with a sequence of cues on the screen.
Your objective is to tap your fingers according to the cued sequence.

Please remain focused and try to follow the instructions as accurately as possible.
The task involves a specific number of repetitions for a set sequence.";

pub const V1_TASK: &str = "\
Welcome to the V1 Orientation Discrimination Task!

In this task, your visual perception abilities will be tested.
You will be shown a series of patterns or stimuli on the screen.
Your objective is to identify the orientation of these patterns and respond accordingly.

Pay close attention to the visual cues and make your responses as quickly and accurately as you can.";
